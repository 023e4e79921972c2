//! Inline keyboard construction.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use adbot_core::messaging::Button;

/// Lay out core `Button`s into rows of `per_row`.
pub fn inline(buttons: &[Button], per_row: usize) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .chunks(per_row.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

pub fn rules() -> InlineKeyboardMarkup {
    inline(
        &[
            Button::new("I agree ✅", "rules:agree"),
            Button::new("I decline ❌", "rules:decline"),
        ],
        2,
    )
}

/// One category per row (labels can be long).
pub fn categories(categories: &[String]) -> InlineKeyboardMarkup {
    let buttons: Vec<Button> = categories
        .iter()
        .map(|c| Button::new(c.clone(), format!("cat:{c}")))
        .collect();
    inline(&buttons, 1)
}

/// Districts fit two per row.
pub fn districts(districts: &[String]) -> InlineKeyboardMarkup {
    let buttons: Vec<Button> = districts
        .iter()
        .map(|d| Button::new(d.clone(), format!("dist:{d}")))
        .collect();
    inline(&buttons, 2)
}
