use async_trait::async_trait;

use crate::error::{MailboxError, SetupError};
use crate::mail_reader::message::Message;

pub mod display;
pub mod encryption;
pub mod imap;
pub mod message;

/// One fetched message, or the reason it could not be read.
pub type Fetched = Result<Message, MailboxError>;

/// An open mailbox the monitor polls and tags.
#[async_trait]
pub trait MailboxSource: Send {
    /// Unread messages currently in the mailbox. Fetching must not mark them read.
    async fn fetch_unread(&mut self) -> Result<Vec<Fetched>, MailboxError>;

    /// Adds `tags` as categories of the message. Existing tags stay.
    async fn apply_tags(&mut self, message_id: &str, tags: &[String]) -> Result<(), MailboxError>;

    async fn close(&mut self) {}
}

/// Opens a [`MailboxSource`]; called once per monitoring run.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MailboxSource>, SetupError>;
}
