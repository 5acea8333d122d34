//! Order confirmation notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.
//! When SMTP is not configured, [`LogNotifier`] records the confirmation in
//! the log instead.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use mockall::automock;
use pickup_core::{Email, OrderId, PickupDate, PickupTime, Price};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// One row of the confirmation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
}

/// Everything needed to tell a customer their order was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub to: Email,
    pub name: String,
    pub order_id: OrderId,
    pub pickup_date: PickupDate,
    pub pickup_time: Option<PickupTime>,
    pub lines: Vec<ConfirmationLine>,
    pub total: Price,
}

impl OrderConfirmation {
    fn pickup(&self) -> String {
        match self.pickup_time {
            Some(time) => format!("{} at {time}", self.pickup_date),
            None => self.pickup_date.to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    lines: &'a [ConfirmationLine],
    total: Price,
    pickup: &'a str,
    order_id: OrderId,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    lines: &'a [ConfirmationLine],
    total: Price,
    pickup: &'a str,
    order_id: OrderId,
}

/// Errors that can occur when sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[automock]
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    /// Tell the customer their order was received.
    async fn order_confirmed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError>;
}

/// SMTP-backed notifier.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Create a new notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be configured or the sender
    /// address is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        let from = config
            .from_address
            .parse()
            .map_err(|_| NotifyError::InvalidAddress(config.from_address.clone()))?;

        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl OrderNotifier for EmailNotifier {
    #[tracing::instrument(skip(self, confirmation), fields(order_id = %confirmation.order_id))]
    async fn order_confirmed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError> {
        let pickup = confirmation.pickup();
        let html = OrderConfirmationHtml {
            name: &confirmation.name,
            lines: &confirmation.lines,
            total: confirmation.total,
            pickup: &pickup,
            order_id: confirmation.order_id,
        }
        .render()?;
        let text = OrderConfirmationText {
            name: &confirmation.name,
            lines: &confirmation.lines,
            total: confirmation.total,
            pickup: &pickup,
            order_id: confirmation.order_id,
        }
        .render()?;

        let to = Mailbox::new(
            Some(confirmation.name.clone()),
            confirmation
                .to
                .as_str()
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(confirmation.to.to_string()))?,
        );

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Order Confirmation")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %confirmation.to, "Order confirmation sent");
        Ok(())
    }
}

/// Notifier used when no mail relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn order_confirmed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %confirmation.order_id,
            to = %confirmation.to,
            total = %confirmation.total,
            "SMTP not configured, skipping order confirmation email"
        );
        Ok(())
    }
}
