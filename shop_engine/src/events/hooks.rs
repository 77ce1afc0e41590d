use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    NewSubscriberEvent,
    OrderAnnulledEvent,
    OrderConfirmedEvent,
    OrderShippedEvent,
    TicketSubmittedEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Publishing ends of every registered hook. Cloned into each API object that emits events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_confirmed_producer: Vec<EventProducer<OrderConfirmedEvent>>,
    pub order_shipped_producer: Vec<EventProducer<OrderShippedEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
    pub new_subscriber_producer: Vec<EventProducer<NewSubscriberEvent>>,
    pub ticket_submitted_producer: Vec<EventProducer<TicketSubmittedEvent>>,
}

impl EventProducers {
    pub async fn order_confirmed(&self, event: OrderConfirmedEvent) {
        for producer in &self.order_confirmed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn order_shipped(&self, event: OrderShippedEvent) {
        for producer in &self.order_shipped_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn order_annulled(&self, event: OrderAnnulledEvent) {
        for producer in &self.order_annulled_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn new_subscriber(&self, event: NewSubscriberEvent) {
        for producer in &self.new_subscriber_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn ticket_submitted(&self, event: TicketSubmittedEvent) {
        for producer in &self.ticket_submitted_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_confirmed: Option<EventHandler<OrderConfirmedEvent>>,
    pub on_order_shipped: Option<EventHandler<OrderShippedEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_new_subscriber: Option<EventHandler<NewSubscriberEvent>>,
    pub on_ticket_submitted: Option<EventHandler<TicketSubmittedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_confirmed: hooks.on_order_confirmed.map(|f| EventHandler::new(buffer_size, f)),
            on_order_shipped: hooks.on_order_shipped.map(|f| EventHandler::new(buffer_size, f)),
            on_order_annulled: hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f)),
            on_new_subscriber: hooks.on_new_subscriber.map(|f| EventHandler::new(buffer_size, f)),
            on_ticket_submitted: hooks.on_ticket_submitted.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_confirmed {
            result.order_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_shipped {
            result.order_shipped_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_new_subscriber {
            result.new_subscriber_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_ticket_submitted {
            result.ticket_submitted_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns one task per registered hook. Each task ends once all of its producers are dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_confirmed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_shipped {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_new_subscriber {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_ticket_submitted {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_confirmed: Option<Handler<OrderConfirmedEvent>>,
    pub on_order_shipped: Option<Handler<OrderShippedEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_new_subscriber: Option<Handler<NewSubscriberEvent>>,
    pub on_ticket_submitted: Option<Handler<TicketSubmittedEvent>>,
}

impl EventHooks {
    pub fn on_order_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderConfirmedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_order_shipped<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderShippedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_shipped = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_new_subscriber<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NewSubscriberEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_new_subscriber = Some(Arc::new(f));
        self
    }

    pub fn on_ticket_submitted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TicketSubmittedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_ticket_submitted = Some(Arc::new(f));
        self
    }
}
