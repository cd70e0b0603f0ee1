use mailparse::{addrparse, parse_mail, DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use serde::{Deserialize, Serialize};
use log::warn;

use crate::error::MailboxError;

/// The parts of an inbound message the categorizer looks at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Mailbox identifier (the IMAP UID for the IMAP backend).
    pub id: String,
    pub subject: String,
    /// Display name of the sender, or the address when there is none.
    pub sender: String,
    pub body: String,
    /// Attachment file names in MIME order.
    pub attachments: Vec<String>,
    /// Existing category tags in the order they were applied.
    pub categories: Vec<String>,
    pub unread: bool,
}

fn attachment_name(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    let file_name = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();

    match (disposition.disposition, file_name) {
        (DispositionType::Attachment, name) => {
            Some(name.unwrap_or_else(|| "unnamed_attachment".to_string()))
        }
        (_, Some(name)) => Some(name),
        _ => None,
    }
}

fn extract_attachment_names(parsed_mail: &ParsedMail) -> Vec<String> {
    fn process_part(part: &ParsedMail, names: &mut Vec<String>) {
        if let Some(name) = attachment_name(part) {
            names.push(name);
        }

        // Recursively process subparts
        for subpart in &part.subparts {
            process_part(subpart, names);
        }
    }

    let mut names = Vec::new();
    process_part(parsed_mail, &mut names);
    names
}

fn extract_text_content(parsed_mail: &ParsedMail) -> Result<Option<String>, mailparse::MailParseError> {
    fn find_text_part(part: &ParsedMail, mimetype: &str) -> Result<Option<String>, mailparse::MailParseError> {
        if part.subparts.is_empty() && part.ctype.mimetype == mimetype && attachment_name(part).is_none() {
            return Ok(Some(part.get_body()?));
        }

        // Recursively search subparts
        for subpart in &part.subparts {
            if let Some(text) = find_text_part(subpart, mimetype)? {
                return Ok(Some(text));
            }
        }

        Ok(None)
    }

    match find_text_part(parsed_mail, "text/plain")? {
        Some(text) => Ok(Some(text)),
        None => Ok(find_text_part(parsed_mail, "text/html")?.map(|html| html_to_text(&html))),
    }
}

/// Elements whose content is never shown to the reader.
const HIDDEN_ELEMENTS: [&str; 4] = ["head", "style", "script", "title"];

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Visible text of an HTML body: markup, comments and hidden elements are dropped.
fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut hidden: Option<String> = None;
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        if hidden.is_none() {
            text.push_str(&decode_entities(&rest[..start]));
        }
        let after = &rest[start + 1..];

        if let Some(comment) = after.strip_prefix("!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }

        let Some(end) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[..end].trim().to_ascii_lowercase();
        let closing = tag.starts_with('/');
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();

        if hidden.is_some() {
            if closing && hidden.as_deref() == Some(name.as_str()) {
                hidden = None;
            }
        } else if !closing && HIDDEN_ELEMENTS.contains(&name.as_str()) {
            hidden = Some(name);
        } else if matches!(name.as_str(), "br" | "p" | "div" | "tr" | "li") && !text.ends_with('\n') {
            text.push('\n');
        }
        rest = &after[end + 1..];
    }

    if hidden.is_none() {
        text.push_str(&decode_entities(rest));
    }
    text.trim().to_string()
}

/// Display name of the first sender, falling back to the bare address.
pub fn sender_name(from: &str) -> String {
    let parsed = match addrparse(from) {
        Ok(list) => list,
        Err(e) => {
            warn!("Cannot parse sender {:?}: {}", from, e);
            return from.trim().to_string();
        }
    };

    match parsed.first() {
        Some(MailAddr::Single(info)) => info
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| info.addr.clone()),
        Some(MailAddr::Group(group)) => group.group_name.clone(),
        None => String::new(),
    }
}

/// Builds a [`Message`] from a raw RFC 822 message.
pub fn parse_message(
    id: &str,
    raw: &[u8],
    categories: Vec<String>,
    unread: bool,
) -> Result<Message, MailboxError> {
    let parse_error = |e: mailparse::MailParseError| MailboxError::Parse {
        message_id: id.to_string(),
        reason: e.to_string(),
    };

    let parsed_mail = parse_mail(raw).map_err(parse_error)?;

    let subject = parsed_mail.headers.get_first_value("Subject").unwrap_or_default();
    let sender = parsed_mail
        .headers
        .get_first_value("From")
        .map(|from| sender_name(&from))
        .unwrap_or_default();

    // Extract text content and attachments
    let body = extract_text_content(&parsed_mail).map_err(parse_error)?.unwrap_or_default();
    let attachments = extract_attachment_names(&parsed_mail);

    Ok(Message {
        id: id.to_string(),
        subject,
        sender,
        body,
        attachments,
        categories,
        unread,
    })
}
