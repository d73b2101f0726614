//! Ticket-show detection over a cast's tip history.
//!
//! A show is a run of at least three consecutive equal-amount tips, each less
//! than 30s after the previous one. It keeps going while the next tips are of
//! the same amount and less than 60s apart. Any tip of another amount ends
//! the run.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct TimedTip {
    pub user_name: String,
    pub tokens: i64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketShow {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub ticket_price: i64,
    pub attendees: usize,
    pub ticket_revenue: i64,
    /// Tips of any other amount inside the show's range.
    pub tip_revenue: i64,
}

const START_GAP_SECS: i64 = 30;
const EXTEND_GAP_SECS: i64 = 60;
const MIN_RUN: usize = 3;

/// Length of the equal-amount run starting at `from` whose gaps stay under `max_gap`.
fn run_end(sorted: &[&TimedTip], from: usize, max_gap: Duration) -> usize {
    let price = sorted[from].tokens;
    let mut end = from;
    while let Some(next) = sorted.get(end + 1) {
        if next.tokens != price || next.at - sorted[end].at >= max_gap {
            break;
        }
        end += 1;
    }
    end
}

pub fn detect_ticket_shows(tips: &[TimedTip]) -> Vec<TicketShow> {
    let mut sorted: Vec<&TimedTip> = tips.iter().collect();
    sorted.sort_by_key(|t| t.at);

    let mut shows = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let streak_end = run_end(&sorted, i, Duration::seconds(START_GAP_SECS));
        if streak_end + 1 - i < MIN_RUN {
            i += 1;
            continue;
        }
        let end = run_end(&sorted, streak_end, Duration::seconds(EXTEND_GAP_SECS));

        let price = sorted[i].tokens;
        let range = &sorted[i..=end];
        let (ticket, other): (Vec<&TimedTip>, Vec<&TimedTip>) = range.iter().copied().partition(|t| t.tokens == price);
        shows.push(TicketShow {
            started_at: sorted[i].at,
            ended_at: sorted[end].at,
            ticket_price: price,
            attendees: ticket.len(),
            ticket_revenue: ticket.iter().map(|t| t.tokens).sum(),
            tip_revenue: other.iter().map(|t| t.tokens).sum(),
        });
        i = end + 1;
    }
    shows
}
