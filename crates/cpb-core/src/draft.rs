//! Post draft and its composition state machine.
//!
//! The draft is a plain value: every mutation goes through [`PostDraft::apply`]
//! (or one of the helpers built on it) so an event that is not legal in the
//! current state leaves the draft untouched.

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::{
    content::{PostContent, UrlButton},
    domain::{MessageRef, UserId},
    errors::Error,
    Result,
};

/// Fixed layout accepted for scheduled posts.
pub const SCHEDULE_LAYOUT: &str = "%Y-%m-%d %H:%M";
pub const SCHEDULE_EXAMPLE: &str = "2024-01-01 15:30";

/// Timer step buttons, in minutes.
pub const TIMER_STEPS: [i64; 3] = [10, 30, 60];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DraftState {
    AwaitingContent,
    HasContent,
    AwaitingButtonText,
    AwaitingScheduleInput,
    AwaitingDestination,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DraftEvent {
    CaptureContent,
    RequestButton,
    AddButton,
    RequestSchedule,
    SetSchedule,
    AdjustTimer,
    ShowPreview,
    ConfirmSend,
    Dispatch,
}

impl DraftState {
    pub fn name(self) -> &'static str {
        match self {
            DraftState::AwaitingContent => "awaiting content",
            DraftState::HasContent => "has content",
            DraftState::AwaitingButtonText => "awaiting button text",
            DraftState::AwaitingScheduleInput => "awaiting schedule input",
            DraftState::AwaitingDestination => "awaiting destination",
        }
    }

    /// Transition table. Cancel is not listed: it is legal everywhere and ends the draft.
    pub fn next(self, event: DraftEvent) -> Result<DraftState> {
        use DraftEvent as E;
        use DraftState as S;

        let to = match (self, event) {
            (S::AwaitingContent, E::CaptureContent) => S::HasContent,
            (S::HasContent, E::RequestButton) => S::AwaitingButtonText,
            (S::AwaitingButtonText, E::AddButton) => S::HasContent,
            (S::HasContent, E::RequestSchedule) => S::AwaitingScheduleInput,
            (S::AwaitingScheduleInput, E::SetSchedule) => S::HasContent,
            (S::HasContent, E::AdjustTimer) => S::HasContent,
            (S::HasContent | S::AwaitingDestination, E::ConfirmSend) => S::AwaitingDestination,
            (
                S::HasContent
                | S::AwaitingButtonText
                | S::AwaitingScheduleInput
                | S::AwaitingDestination,
                E::ShowPreview,
            ) => S::HasContent,
            (S::AwaitingDestination, E::Dispatch) => S::AwaitingDestination,
            (from, event) => {
                return Err(Error::InvalidTransition {
                    from: from.name(),
                    event: event.name(),
                })
            }
        };
        Ok(to)
    }
}

impl DraftEvent {
    pub fn name(self) -> &'static str {
        match self {
            DraftEvent::CaptureContent => "capture content",
            DraftEvent::RequestButton => "add button",
            DraftEvent::AddButton => "button text",
            DraftEvent::RequestSchedule => "schedule",
            DraftEvent::SetSchedule => "schedule text",
            DraftEvent::AdjustTimer => "timer",
            DraftEvent::ShowPreview => "preview",
            DraftEvent::ConfirmSend => "send",
            DraftEvent::Dispatch => "dispatch",
        }
    }
}

/// Direction of a timer step button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerStep {
    Plus(i64),
    Minus(i64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PostDraft {
    pub owner: UserId,
    pub content: Option<PostContent>,
    pub buttons: Vec<UrlButton>,
    pub self_destruct_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub preview: Option<MessageRef>,
    state: DraftState,
}

impl PostDraft {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            content: None,
            buttons: Vec::new(),
            self_destruct_at: None,
            scheduled_at: None,
            preview: None,
            state: DraftState::AwaitingContent,
        }
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    /// Move to the state `event` leads to, or fail without touching the draft.
    pub fn apply(&mut self, event: DraftEvent) -> Result<DraftState> {
        let to = self.state.next(event)?;
        self.state = to;
        Ok(to)
    }

    pub fn capture_content(&mut self, content: PostContent) -> Result<()> {
        self.apply(DraftEvent::CaptureContent)?;
        self.content = Some(content);
        Ok(())
    }

    /// Parse a button line and append it. A bad line keeps the draft waiting for input.
    pub fn add_button(&mut self, input: &str) -> Result<&UrlButton> {
        self.state.next(DraftEvent::AddButton)?;
        let button = UrlButton::parse(input)?;
        self.apply(DraftEvent::AddButton)?;
        self.buttons.push(button);
        Ok(&self.buttons[self.buttons.len() - 1])
    }

    /// Activate the self-destruct timer if needed. Returns the current deadline.
    pub fn activate_timer(&mut self, now: DateTime<Utc>, default: Duration) -> Result<DateTime<Utc>> {
        self.apply(DraftEvent::AdjustTimer)?;
        Ok(*self.self_destruct_at.get_or_insert(now + default))
    }

    /// Step the timer. Decrements that would land at or before `now` are ignored.
    ///
    /// Returns whether the deadline moved.
    pub fn step_timer(
        &mut self,
        step: TimerStep,
        now: DateTime<Utc>,
        default: Duration,
    ) -> Result<bool> {
        let current = self.activate_timer(now, default)?;
        let next = match step {
            TimerStep::Plus(m) => current + Duration::minutes(m),
            TimerStep::Minus(m) => current - Duration::minutes(m),
        };
        if next <= now {
            return Ok(false);
        }
        self.self_destruct_at = Some(next);
        Ok(true)
    }

    pub fn clear_timer(&mut self) -> Result<()> {
        self.apply(DraftEvent::AdjustTimer)?;
        self.self_destruct_at = None;
        Ok(())
    }

    /// Parse `YYYY-MM-DD HH:MM` (local time) and record it if it lies in the future.
    pub fn set_schedule(&mut self, input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.state.next(DraftEvent::SetSchedule)?;
        let at = parse_schedule(input)?;
        if at <= now {
            return Err(Error::Validation(
                "The scheduled time must be in the future".to_string(),
            ));
        }
        self.apply(DraftEvent::SetSchedule)?;
        self.scheduled_at = Some(at);
        Ok(at)
    }
}

/// Whole minutes left until `at`, clamped at zero.
pub fn minutes_until(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    at.map(|t| (t - now).num_minutes().max(0)).unwrap_or(0)
}

fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    let layout = Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}$")
        .map_err(|e| Error::Validation(format!("schedule pattern: {e}")))?;
    let input = input.trim();
    if !layout.is_match(input) {
        return Err(Error::Validation(format!(
            "Use the format YYYY-MM-DD HH:MM, e.g. {SCHEDULE_EXAMPLE}"
        )));
    }
    let naive = NaiveDateTime::parse_from_str(input, SCHEDULE_LAYOUT)
        .map_err(|e| Error::Validation(format!("Invalid date: {e}")))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::Validation("That local time does not exist".to_string()))?;
    Ok(local.with_timezone(&Utc))
}
