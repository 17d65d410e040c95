//! Exchange and queue layout
//!
//! ```text
//!  publish ──► <exchange> (topic) ──rk──► <queue>
//!                  ▲                        │ nack (requeue = false)
//!                  │                        ▼
//!                  │               <exchange>.retry (topic) ──rk──► <queue>.retry
//!                  │                                                   │ x-message-ttl
//!                  └───────────────────────────────────────────────────┘
//! ```
//!
//! A negatively acknowledged message waits `retry_delay_secs` in the retry
//! queue and is then dead-lettered back onto the main exchange under its
//! original routing key. Everything is declared durable; declarations are
//! idempotent so every process may declare on startup.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use wxnotify_core::config::BrokerConfig;
use wxnotify_core::{Error, Result};

pub fn retry_exchange(exchange: &str) -> String {
    format!("{}.retry", exchange)
}

pub fn retry_queue(queue: &str) -> String {
    format!("{}.retry", queue)
}

/// Arguments of a consumable queue: rejected messages go to the retry exchange
pub fn queue_arguments(exchange: &str, routing_key: &str) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(retry_exchange(exchange).into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(routing_key.into()),
    );
    args
}

/// Arguments of a retry queue: expired messages return to the main exchange
pub fn retry_queue_arguments(exchange: &str, routing_key: &str, delay_secs: u64) -> FieldTable {
    let ttl_ms = i64::try_from(delay_secs.saturating_mul(1000)).unwrap_or(i64::MAX);

    let mut args = FieldTable::default();
    args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(ttl_ms));
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(exchange.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(routing_key.into()),
    );
    args
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..Default::default()
    }
}

async fn declare_exchange(channel: &Channel, name: &str) -> Result<()> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::config(format!("Exchange {} declaration failed: {}", name, e)))
}

async fn declare_bound_queue(
    channel: &Channel,
    queue: &str,
    exchange: &str,
    routing_key: &str,
    arguments: FieldTable,
) -> Result<()> {
    channel
        .queue_declare(queue, durable_queue(), arguments)
        .await
        .map_err(|e| Error::config(format!("Queue {} declaration failed: {}", queue, e)))?;

    channel
        .queue_bind(
            queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::config(format!("Queue {} binding failed: {}", queue, e)))?;

    Ok(())
}

/// Declare exchanges, queues and bindings for every configured routing key
pub async fn declare(channel: &Channel, config: &BrokerConfig) -> Result<()> {
    let retry = retry_exchange(&config.exchange);

    declare_exchange(channel, &config.exchange).await?;
    declare_exchange(channel, &retry).await?;

    for (routing_key, queue) in config.bindings() {
        declare_bound_queue(
            channel,
            queue,
            &config.exchange,
            routing_key,
            queue_arguments(&config.exchange, routing_key),
        )
        .await?;

        declare_bound_queue(
            channel,
            &retry_queue(queue),
            &retry,
            routing_key,
            retry_queue_arguments(&config.exchange, routing_key, config.retry_delay_secs),
        )
        .await?;

        tracing::debug!(
            queue = %queue,
            routing_key = %routing_key,
            retry_delay_secs = config.retry_delay_secs,
            "Queue declared"
        );
    }

    Ok(())
}
