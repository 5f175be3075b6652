//! Queue transport seam and its AMQP implementation.
//!
//! The gateway polls jobs and publishes verdicts through the [`Transport`]
//! trait; [`AmqpTransport`] is the production implementation over an AMQP
//! 0.9.1 broker. Inbound deliveries are settled through consuming
//! [`InboundJob::ack`] / [`InboundJob::reject`], so a delivery cannot be
//! acked or nacked twice.
//!
//! Wire topology (re-declared idempotently on every reconnect): a durable
//! topic exchange with one durable queue bound per direction.

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::GatewayError;

/// Topic exchange carrying both directions.
pub const EXCHANGE_NAME: &str = "grading";

/// Queue the grader consumes jobs from.
pub const REQUEST_QUEUE_NAME: &str = "grading_request";

/// Queue verdicts are delivered to.
pub const RESPONSE_QUEUE_NAME: &str = "grading_response";

/// Routing key binding the request queue.
pub const ROUTING_KEY_REQUEST: &str = "request";

/// Routing key binding the response queue.
pub const ROUTING_KEY_RESPONSE: &str = "response";

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// One delivery pulled from the request queue.
///
/// Settling consumes the job: exactly one of `ack` or `reject` can ever
/// run for a delivery.
#[async_trait]
pub trait InboundJob: Send {
    /// Raw message body.
    fn body(&self) -> &[u8];

    /// Acknowledges the delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker refuses the acknowledgement.
    async fn ack(self: Box<Self>) -> Result<()>;

    /// Rejects the delivery, optionally returning it to the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker refuses the rejection.
    async fn reject(self: Box<Self>, requeue: bool) -> Result<()>;
}

/// Broker operations the gateway needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ensures a usable connection and the wire topology exist, dialing
    /// and re-declaring if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot be reached; the next tick
    /// retries.
    async fn ensure_open(&self) -> Result<()>;

    /// Non-blocking fetch of at most one job (manual acknowledgement).
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails; `Ok(None)` means the queue is
    /// empty.
    async fn get(&self) -> Result<Option<Box<dyn InboundJob>>>;

    /// Publishes one verdict body to the response routing key.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker does not accept the message.
    async fn publish(&self, body: &[u8]) -> Result<()>;
}

struct AmqpState {
    connection: Connection,
    channel: Channel,
}

/// AMQP-backed [`Transport`] with lazy reconnect.
pub struct AmqpTransport {
    url: String,
    state: Mutex<Option<AmqpState>>,
}

impl AmqpTransport {
    /// Creates a transport for the given broker URL. Nothing is dialed
    /// until the first [`Transport::ensure_open`].
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(None),
        }
    }

    async fn open_channel(&self) -> Result<AmqpState> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| GatewayError::broker("connect", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| GatewayError::broker("channel", e))?;

        for queue in [REQUEST_QUEUE_NAME, RESPONSE_QUEUE_NAME] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| GatewayError::broker("declare", e))?;
        }

        channel
            .exchange_declare(
                EXCHANGE_NAME,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::broker("declare", e))?;

        channel
            .queue_bind(
                REQUEST_QUEUE_NAME,
                EXCHANGE_NAME,
                ROUTING_KEY_REQUEST,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::broker("bind", e))?;
        channel
            .queue_bind(
                RESPONSE_QUEUE_NAME,
                EXCHANGE_NAME,
                ROUTING_KEY_RESPONSE,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::broker("bind", e))?;

        info!(url = %self.url, "amqp connected");
        Ok(AmqpState {
            connection,
            channel,
        })
    }

    async fn current_channel(&self) -> Result<Channel> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|s| s.channel.clone())
            .ok_or_else(|| GatewayError::Unavailable("not connected".to_string()))
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn ensure_open(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state
            .as_ref()
            .is_some_and(|s| s.connection.status().connected())
        {
            return Ok(());
        }

        if state.is_some() {
            debug!("amqp connection lost, re-dialing");
        }
        *state = Some(self.open_channel().await?);
        Ok(())
    }

    async fn get(&self) -> Result<Option<Box<dyn InboundJob>>> {
        let channel = self.current_channel().await?;
        let message = channel
            .basic_get(REQUEST_QUEUE_NAME, BasicGetOptions { no_ack: false })
            .await
            .map_err(|e| GatewayError::broker("get", e))?;

        Ok(message.map(|m| Box::new(AmqpJob { delivery: m.delivery }) as Box<dyn InboundJob>))
    }

    async fn publish(&self, body: &[u8]) -> Result<()> {
        let channel = self.current_channel().await?;
        channel
            .basic_publish(
                EXCHANGE_NAME,
                ROUTING_KEY_RESPONSE,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| GatewayError::broker("publish", e))?
            .await
            .map_err(|e| GatewayError::broker("publish", e))?;
        Ok(())
    }
}

struct AmqpJob {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl InboundJob for AmqpJob {
    fn body(&self) -> &[u8] {
        &self.delivery.data
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        self.delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| GatewayError::broker("ack", e))
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<()> {
        self.delivery
            .acker
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map_err(|e| GatewayError::broker("nack", e))
    }
}
