//! Inline keyboards shown during composition and channel management.

use crate::{
    callbacks::{ChannelAction, PostAction},
    draft::{TimerStep, TIMER_STEPS},
    messaging::types::{InlineButton, InlineKeyboard},
    registry::ChannelLink,
};

/// Slice bounds of one 1-based page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub total: usize,
    pub start: usize,
    pub end: usize,
}

impl Page {
    /// Clamp `requested` into `1..=total` (an empty list still has one page).
    pub fn of(len: usize, requested: usize, size: usize) -> Self {
        let size = size.max(1);
        let total = len.div_ceil(size).max(1);
        let number = requested.clamp(1, total);
        let start = (number - 1) * size;
        let end = (start + size).min(len);
        Self {
            number,
            total,
            start,
            end,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total
    }
}

pub fn action_menu() -> InlineKeyboard {
    InlineKeyboard::one_per_row(vec![
        InlineButton::callback("🔗 Add URL Button", PostAction::AddButton.encode()),
        InlineButton::callback("⏲️ Self-Destruct Timer", PostAction::Timer.encode()),
        InlineButton::callback("📅 Schedule Post", PostAction::Schedule.encode()),
        InlineButton::callback("📤 Send Post", PostAction::Send.encode()),
        InlineButton::callback("❌ Cancel", PostAction::Cancel.encode()),
    ])
}

pub fn back_to_preview() -> InlineKeyboard {
    InlineKeyboard::one_per_row(vec![InlineButton::callback(
        "« Back",
        PostAction::Preview.encode(),
    )])
}

pub fn confirm_send_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        InlineButton::callback("✅ Yes", PostAction::ConfirmSend.encode()),
        InlineButton::callback("❌ No", PostAction::Preview.encode()),
    ]])
}

pub fn timer_menu(minutes_left: i64) -> InlineKeyboard {
    let mut rows = vec![vec![InlineButton::callback(
        format!("Self-destruct after: {minutes_left} minutes"),
        PostAction::TimerInfo.encode(),
    )]];
    for step in TIMER_STEPS {
        rows.push(vec![
            InlineButton::callback(
                format!("-{}", step_label(step)),
                PostAction::TimerStep(TimerStep::Minus(step)).encode(),
            ),
            InlineButton::callback(
                format!("+{}", step_label(step)),
                PostAction::TimerStep(TimerStep::Plus(step)).encode(),
            ),
        ]);
    }
    rows.push(vec![InlineButton::callback(
        "None",
        PostAction::TimerNone.encode(),
    )]);
    rows.push(vec![InlineButton::callback(
        "« Back",
        PostAction::Preview.encode(),
    )]);
    InlineKeyboard::new(rows)
}

fn step_label(minutes: i64) -> String {
    if minutes % 60 == 0 {
        format!("{}h", minutes / 60)
    } else {
        format!("{minutes}m")
    }
}

/// "Send to all", one page of channels, navigation, cancel.
pub fn destination_menu(links: &[ChannelLink], page: usize, page_size: usize) -> InlineKeyboard {
    let page = Page::of(links.len(), page, page_size);

    let mut rows = vec![vec![InlineButton::callback(
        "📢 Send to All Channels",
        PostAction::SendAll.encode(),
    )]];
    for link in &links[page.start..page.end] {
        rows.push(vec![InlineButton::callback(
            link.title.clone(),
            PostAction::SendTo(link.channel_id).encode(),
        )]);
    }

    let mut nav = Vec::new();
    if page.has_prev() {
        nav.push(InlineButton::callback(
            "« Previous",
            PostAction::Page(page.number - 1).encode(),
        ));
    }
    if page.has_next() {
        nav.push(InlineButton::callback(
            "Next »",
            PostAction::Page(page.number + 1).encode(),
        ));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    rows.push(vec![InlineButton::callback(
        "❌ Cancel",
        PostAction::Cancel.encode(),
    )]);
    InlineKeyboard::new(rows)
}

pub fn disconnect_menu(links: &[ChannelLink], page: usize, page_size: usize) -> InlineKeyboard {
    let page = Page::of(links.len(), page, page_size);

    let mut rows: Vec<Vec<InlineButton>> = links[page.start..page.end]
        .iter()
        .map(|link| {
            vec![InlineButton::callback(
                link.title.clone(),
                ChannelAction::Ask {
                    channel_id: link.channel_id,
                    page: page.number,
                }
                .encode(),
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page.has_prev() {
        nav.push(InlineButton::callback(
            "⬅️ Prev",
            ChannelAction::Page(page.number - 1).encode(),
        ));
    }
    if page.has_next() {
        nav.push(InlineButton::callback(
            "Next ➡️",
            ChannelAction::Page(page.number + 1).encode(),
        ));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }
    InlineKeyboard::new(rows)
}

pub fn disconnect_confirm(link: &ChannelLink, page: usize) -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        InlineButton::callback(
            "✅ Yes",
            ChannelAction::Confirm {
                channel_id: link.channel_id,
                page,
            }
            .encode(),
        ),
        InlineButton::callback("❌ No", ChannelAction::Abort { page }.encode()),
    ]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, UserId};
    use chrono::Utc;

    fn links(n: usize) -> Vec<ChannelLink> {
        (0..n)
            .map(|i| ChannelLink {
                owner: UserId(1),
                channel_id: ChatId(-1000000000000 - i as i64),
                title: format!("Channel {i}"),
                username: None,
                linked_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn page_bounds_are_clamped() {
        assert_eq!(
            Page::of(12, 3, 5),
            Page {
                number: 3,
                total: 3,
                start: 10,
                end: 12
            }
        );
        assert_eq!(Page::of(12, 9, 5).number, 3);
        assert_eq!(Page::of(0, 1, 5).total, 1);
        assert_eq!(Page::of(5, 0, 5).number, 1);
    }

    #[test]
    fn destination_menu_pages_channels() {
        let kb = destination_menu(&links(7), 1, 5);
        let data = kb.callback_data();
        assert_eq!(data[0], "send:all");
        assert_eq!(data.iter().filter(|d| d.starts_with("send:-")).count(), 5);
        assert!(data.contains(&"page:2"));
        assert!(!data.iter().any(|d| d.starts_with("page:0")));
        assert_eq!(*data.last().unwrap(), "post:cancel");

        let second = destination_menu(&links(7), 2, 5);
        let data = second.callback_data();
        assert_eq!(data.iter().filter(|d| d.starts_with("send:-")).count(), 2);
        assert!(data.contains(&"page:1"));
        assert!(!data.contains(&"page:3"));
    }

    #[test]
    fn timer_menu_shows_remaining_minutes() {
        let kb = timer_menu(45);
        assert_eq!(kb.rows[0][0].label, "Self-destruct after: 45 minutes");
        assert_eq!(kb.rows[3][0].label, "-1h");
        assert_eq!(kb.rows[3][1].label, "+1h");
        assert!(kb.callback_data().contains(&"timer:-10"));
    }

    #[test]
    fn disconnect_menu_has_no_nav_for_single_page() {
        let kb = disconnect_menu(&links(2), 1, 5);
        assert_eq!(kb.rows.len(), 2);
        assert!(kb.callback_data().iter().all(|d| d.starts_with("dc:ask:")));
    }
}
