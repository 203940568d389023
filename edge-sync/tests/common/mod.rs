//! 集成测试公共工具
//!
//! 内存存储 + 模拟后端 + 通道监听器

#![allow(dead_code)]

use std::sync::Arc;

use edge_sync::{
    ChannelListener, InMemoryBackend, MemoryOrderStore, OrderStore, SyncConfig, SyncEvent,
    SyncService,
};
use rust_decimal::Decimal;
use shared::order::{OrderItem, OrderSnapshot, OrderStatus};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Pending order with two items
pub fn pending_order(seat: &str) -> OrderSnapshot {
    let mut order = OrderSnapshot::new(Uuid::new_v4(), seat);
    order.add_item(OrderItem::new(Uuid::new_v4(), "Chicken Wrap", 1, d("14.99")));
    order.add_item(OrderItem::new(Uuid::new_v4(), "Orange Juice", 2, d("5.00")));
    order.set_status(OrderStatus::Pending);
    order
}

pub struct Harness {
    pub service: Arc<SyncService>,
    pub store: Arc<MemoryOrderStore>,
    pub backend: Arc<InMemoryBackend>,
    pub events: UnboundedReceiver<SyncEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(InMemoryBackend::new(), SyncConfig::for_tests())
    }

    pub fn with(backend: InMemoryBackend, config: SyncConfig) -> Self {
        edge_sync::init_logger_from_config(&config);
        let store = Arc::new(MemoryOrderStore::new());
        let backend = Arc::new(backend);
        let service = Arc::new(SyncService::new(config, store.clone(), backend.clone()));
        let (listener, events) = ChannelListener::new();
        service.add_listener(Arc::new(listener));
        Self {
            service,
            store,
            backend,
            events,
        }
    }

    pub async fn seed(&self, orders: &[OrderSnapshot]) {
        for order in orders {
            self.store.save(order).await.unwrap();
        }
    }

    /// Store copy of an order
    pub fn local(&self, order_id: Uuid) -> OrderSnapshot {
        self.store.get(order_id).unwrap()
    }

    /// Everything emitted so far
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Seed one pending order and push it so both sides agree
    pub async fn synced_order(&self, seat: &str) -> OrderSnapshot {
        let order = pending_order(seat);
        self.seed(std::slice::from_ref(&order)).await;
        let result = self.service.synchronize_order(order.order_id).await;
        assert!(result.success, "{}", result.message);
        self.local(order.order_id)
    }
}
