mod cucumber;

use ::cucumber::{codegen::LocalBoxFuture, event::ScenarioFinished, gherkin, writer, World};
use futures_util::FutureExt;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

use crate::cucumber::ShopWorld;

fn main() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let sys = Runtime::new().expect("Error creating tokio runtime");
    sys.block_on(
        ShopWorld::cucumber()
            .with_writer(writer::Libtest::or_basic())
            .after(|_f, _r, scenario, ev, w| post_test_hook(scenario, ev, w))
            .run("tests/features"),
    );
    info!("🚀️ Tests complete");
}

fn post_test_hook<'a>(
    scenario: &'a gherkin::Scenario,
    ev: &'a ScenarioFinished,
    world: Option<&'a mut ShopWorld>,
) -> LocalBoxFuture<'a, ()> {
    let fut = async move {
        trace!("🚀️ After-scenario hook running for \"{}\"", scenario.name);
        let Some(shop) = world.and_then(|w| w.shop.take()) else {
            warn!("🚀️ No shop was started. Nothing to clean up.");
            return;
        };
        let db_path = shop.db.url().to_string();
        match ev {
            ScenarioFinished::StepFailed(_, _, _) | ScenarioFinished::StepSkipped => {
                error!("🚀️ Error in scenario, database retained: {db_path}");
            },
            ScenarioFinished::StepPassed => {
                debug!("🚀️ Scenario complete, removing database: {db_path}");
                shop.orders.watchers().stop_all();
                shop.db.pool().close().await;
                if let Err(e) = Sqlite::drop_database(&db_path).await {
                    warn!("🚀️ Could not remove {db_path}: {e}");
                }
            },
            _ => trace!("🚀️ Unhandled event: {ev:?}"),
        }
        trace!("🚀️ After-scenario hook complete");
    };
    fut.boxed_local()
}
