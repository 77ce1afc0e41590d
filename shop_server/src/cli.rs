use std::{env, env::VarError};

/// There's no real CLI for the daemon, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

/// Variables that are safe to print. Never add keys or secrets here.
const DISPLAY_ENVS: [&str; 27] = [
    "RUST_LOG",
    "SHOP_DATABASE_URL",
    "SHOP_DB_MAX_CONNECTIONS",
    "SHOP_BASE_CURRENCY",
    "SHOP_MAX_ORDER_ITEMS",
    "SHOP_FX_REFRESH_INTERVAL",
    "SHOP_FX_FIAT_URL",
    "SHOP_FX_CRYPTO_URL",
    "SHOP_HTTP_TIMEOUT",
    "SHOP_CARD_PAYMENT_TTL",
    "SHOP_CARD_EXPIRY_INTERVAL",
    "SHOP_CART_RESERVATION_TTL",
    "SHOP_ORDER_RESERVATION_TTL",
    "SHOP_MAX_CART_ITEMS",
    "SHOP_MAX_QTY_PER_ITEM",
    "SHOP_MAX_RESERVATIONS",
    "SHOP_CRYPTO_CHECK_INTERVAL",
    "SHOP_CRYPTO_INVOICE_EXPIRATION",
    "SHOP_ETH_ADDRESSES",
    "SHOP_ETH_TEST_ADDRESSES",
    "SHOP_USDT_TRON_ADDRESSES",
    "SHOP_USDT_TRON_CONTRACT",
    "SHOP_USDT_TRON_TEST_ADDRESSES",
    "SHOP_USDT_TRON_TEST_CONTRACT",
    "SHOP_STRIPE_API_URL",
    "SHOP_TRONGRID_URL",
    "SHOP_ETHERSCAN_URL",
];

fn display_envs() {
    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
