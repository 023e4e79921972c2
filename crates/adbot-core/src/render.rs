//! Listing rendering (Telegram-flavoured HTML captions).

use crate::domain::Listing;

/// Escape HTML special characters for HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Public caption for a published listing.
pub fn listing_caption(l: &Listing) -> String {
    let mut tags = Vec::new();
    if let Some(first) = l.category.split_whitespace().next() {
        tags.push(format!("#{first}"));
    }
    if !l.district.is_empty() {
        tags.push(format!("#{}", l.district.replace(['-', ' '], "")));
    }

    format!(
        "<b>{title}</b>\n\n{description}\n\n<b>District:</b> {district}\n<b>Category:</b> {category}\n<b>Contacts:</b> {contacts}\n\n{tags}",
        title = escape_html(&l.title),
        description = escape_html(&l.description),
        district = escape_html(&l.district),
        category = escape_html(&l.category),
        contacts = escape_html(&l.contacts),
        tags = tags.join(" "),
    )
    .trim_end()
    .to_string()
}

/// Moderation-card caption: the public caption plus author/id lines the
/// moderators need.
pub fn moderation_caption(l: &Listing) -> String {
    format!(
        "{base}\n\n<b>Author:</b> <a href=\"tg://user?id={author}\">{author}</a>\n<b>Listing:</b> #{id}",
        base = listing_caption(l),
        author = l.author.0,
        id = l.id.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Listing, ListingId, ListingStatus, UserId};
    use chrono::Utc;

    fn listing() -> Listing {
        Listing {
            id: ListingId(42),
            author: UserId(7),
            category: "Lost pet".to_string(),
            district: "Central".to_string(),
            title: "Orange cat <missing>".to_string(),
            description: "Seen near the park".to_string(),
            contacts: "+1-555-0100".to_string(),
            photos: vec![],
            created_at: Utc::now(),
            status: ListingStatus::Queued,
            reject_reason: None,
            approved_at: None,
            published_at: None,
        }
    }

    #[test]
    fn caption_escapes_html_and_builds_tags() {
        let text = listing_caption(&listing());
        assert!(text.contains("<b>Orange cat &lt;missing&gt;</b>"));
        assert!(text.contains("<b>District:</b> Central"));
        assert!(text.contains("#Lost #Central"));
    }

    #[test]
    fn moderation_caption_appends_author_and_id() {
        let text = moderation_caption(&listing());
        assert!(text.contains("tg://user?id=7"));
        assert!(text.contains("<b>Listing:</b> #42"));
    }
}
