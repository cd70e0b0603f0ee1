use async_imap::error::Error as ImapError;
use async_imap::types::{Fetch, Flag};
use async_imap::{Client, Session};
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::error::{MailboxError, SetupError};
use crate::mail_reader::message::{parse_message, Message};
use crate::mail_reader::{Fetched, MailboxConnector, MailboxSource};
use crate::settings::ImapConfig;
use log::{debug, info, warn};

type ImapStream = Compat<tokio_native_tls::TlsStream<TcpStream>>;
type ImapSession = Session<ImapStream>;

/// Keywords that clients set for their own bookkeeping; never categories.
const CLIENT_KEYWORDS: [&str; 3] = ["Junk", "NonJunk", "Forwarded"];

// Establish a TLS-encrypted connection to the IMAP server
async fn connect_to_server(server: &str, port: u16) -> Result<tokio_native_tls::TlsStream<TcpStream>, SetupError> {
    let connect_error = |reason: String| SetupError::Connect {
        server: server.to_string(),
        port,
        reason,
    };

    let tcp_stream = TcpStream::connect((server, port))
        .await
        .map_err(|e| connect_error(e.to_string()))?;
    let connector = native_tls::TlsConnector::new().map_err(|e| connect_error(e.to_string()))?;
    let tls = tokio_native_tls::TlsConnector::from(connector);
    let tls_stream = tls
        .connect(server, tcp_stream)
        .await
        .map_err(|e| connect_error(e.to_string()))?;

    info!("-- connected to {}:{}", server, port);
    Ok(tls_stream)
}

// Login to the IMAP server and return an authenticated session
async fn login_to_server(
    client: Client<ImapStream>,
    username: &str,
    password: &str,
) -> Result<ImapSession, SetupError> {
    let imap_session = client
        .login(username, password)
        .await
        .map_err(|(e, _client)| SetupError::Login {
            username: username.to_string(),
            reason: e.to_string(),
        })?;

    info!("-- logged in as {}", username);
    Ok(imap_session)
}

pub async fn create_session(config: &ImapConfig, password: &str) -> Result<ImapSession, SetupError> {
    let tls_stream = connect_to_server(&config.server, config.port).await?;
    let client = Client::new(tls_stream.compat());
    login_to_server(client, &config.username, password).await
}

fn is_connection_error(error: &ImapError) -> bool {
    matches!(error, ImapError::Io(_) | ImapError::ConnectionLost)
}

fn categories_from_flags(fetch: &Fetch) -> (Vec<String>, bool) {
    let mut seen = false;
    let mut categories = Vec::new();
    for flag in fetch.flags() {
        match flag {
            Flag::Seen => seen = true,
            Flag::Custom(keyword) => {
                let keyword = keyword.as_ref();
                if !keyword.starts_with('$') && !CLIENT_KEYWORDS.contains(&keyword) {
                    categories.push(keyword.to_string());
                }
            }
            _ => {}
        }
    }
    (categories, !seen)
}

fn process_fetch(fetch: &Fetch) -> Fetched {
    let id = match fetch.uid {
        Some(uid) => uid.to_string(),
        None => {
            return Err(MailboxError::Parse {
                message_id: format!("seq {}", fetch.message),
                reason: "server did not return a UID".to_string(),
            })
        }
    };
    let raw = fetch.body().ok_or_else(|| MailboxError::Parse {
        message_id: id.clone(),
        reason: "message did not have a body".to_string(),
    })?;

    let (categories, unread) = categories_from_flags(fetch);
    parse_message(&id, raw, categories, unread)
}

/// IMAP mailbox; categories are stored as message keywords.
pub struct ImapMailbox {
    session: ImapSession,
    mailbox: String,
}

#[async_trait]
impl MailboxSource for ImapMailbox {
    async fn fetch_unread(&mut self) -> Result<Vec<Fetched>, MailboxError> {
        let fetch_error = |e: ImapError| {
            if is_connection_error(&e) {
                MailboxError::Disconnected(e.to_string())
            } else {
                MailboxError::Fetch(e.to_string())
            }
        };

        let uids = self.session.uid_search("UNSEEN").await.map_err(fetch_error)?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let uid_set = uids.iter().sorted().join(",");
        debug!("Unread UIDs in {}: {}", self.mailbox, uid_set);

        // Fetch flags and the full message without setting \Seen
        let messages_stream = self
            .session
            .uid_fetch(&uid_set, "(UID FLAGS BODY.PEEK[])")
            .await
            .map_err(fetch_error)?;
        let fetches: Vec<Fetch> = messages_stream.try_collect().await.map_err(fetch_error)?;

        Ok(fetches.iter().map(process_fetch).collect())
    }

    async fn apply_tags(&mut self, message_id: &str, tags: &[String]) -> Result<(), MailboxError> {
        let store_error = |e: ImapError| {
            if is_connection_error(&e) {
                MailboxError::Disconnected(e.to_string())
            } else {
                MailboxError::Store {
                    message_id: message_id.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let query = format!("+FLAGS.SILENT ({})", tags.join(" "));
        let updates = self
            .session
            .uid_store(message_id, &query)
            .await
            .map_err(store_error)?;
        let _: Vec<Fetch> = updates.try_collect().await.map_err(store_error)?;
        Ok(())
    }

    async fn close(&mut self) {
        // Be nice to the server and log out
        if let Err(e) = self.session.logout().await {
            warn!("Logout from {} failed: {}", self.mailbox, e);
        }
    }
}

/// Connects to the configured IMAP account and selects the watched mailbox.
pub struct ImapConnector {
    config: ImapConfig,
    password: String,
}

impl ImapConnector {
    pub fn new(config: ImapConfig, password: String) -> Self {
        Self { config, password }
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self) -> Result<Box<dyn MailboxSource>, SetupError> {
        let mut session = create_session(&self.config, &self.password).await?;

        match session.select(&self.config.mailbox).await {
            Ok(mailbox) => info!("-- {} selected ({} messages)", self.config.mailbox, mailbox.exists),
            Err(ImapError::No(reason)) | Err(ImapError::Bad(reason)) => {
                warn!("Cannot select {}: {}", self.config.mailbox, reason);
                return Err(SetupError::MailboxNotFound(self.config.mailbox.clone()));
            }
            Err(e) => return Err(SetupError::Lost(MailboxError::Disconnected(e.to_string()))),
        }

        Ok(Box::new(ImapMailbox {
            session,
            mailbox: self.config.mailbox.clone(),
        }))
    }
}

/// Fetches the unread messages once, for dry runs.
pub async fn fetch_unread_messages(config: &ImapConfig, password: &str) -> Result<Vec<Message>, SetupError> {
    let connector = ImapConnector::new(config.clone(), password.to_string());
    let mut mailbox = connector.connect().await?;
    let fetched = mailbox.fetch_unread().await;
    mailbox.close().await;

    let messages = fetched?
        .into_iter()
        .filter_map(|message| match message {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect();
    Ok(messages)
}
