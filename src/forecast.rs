use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::Serialize;

use crate::models::Card;

pub const HOURS_PER_DAY: usize = 24;
pub const FORECAST_DAYS: usize = 7;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourBucket {
    pub hour: u32,
    pub count: u64,
    /// Running total through this hour, scoped to the bucket's day.
    pub cumulative: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub date: NaiveDate,
    pub count: u64,
    /// Running total across the week window through this day.
    pub cumulative: u64,
    pub hours: Vec<HourBucket>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub today: Vec<HourBucket>,
    pub week: Vec<DayBucket>,
    pub cards_due_now: u64,
}

/// Buckets a user's cards by when they become due: 24 hourly buckets for
/// the current UTC day and 7 daily buckets (today..+6), each day carrying
/// its own hourly sub-buckets. Pure over the given cards.
///
/// Cards already due are counted into the hour containing `now`, so a card
/// due now shows up in `cards_due_now`, the current hour bucket, and
/// today's day bucket. Cards due past the window are left out entirely.
pub fn build_forecast(cards: &[Card], now: DateTime<Utc>) -> Forecast {
    let today = now.date_naive();
    let day_start = today.and_time(NaiveTime::MIN).and_utc();
    let window_end = day_start + Duration::days(FORECAST_DAYS as i64);

    let mut counts = [[0u64; HOURS_PER_DAY]; FORECAST_DAYS];
    let mut cards_due_now = 0u64;

    for card in cards {
        let effective = if card.is_due(now) {
            cards_due_now += 1;
            now
        } else {
            card.next_review
        };
        if effective >= window_end {
            continue;
        }
        let day_index = (effective.date_naive() - today).num_days() as usize;
        counts[day_index][effective.hour() as usize] += 1;
    }

    let mut week = Vec::with_capacity(FORECAST_DAYS);
    let mut week_running = 0u64;
    for (day_index, day_counts) in counts.iter().enumerate() {
        let mut hours = Vec::with_capacity(HOURS_PER_DAY);
        let mut day_running = 0u64;
        for (hour, &count) in day_counts.iter().enumerate() {
            day_running += count;
            hours.push(HourBucket {
                hour: hour as u32,
                count,
                cumulative: day_running,
            });
        }
        week_running += day_running;
        week.push(DayBucket {
            date: today + Duration::days(day_index as i64),
            count: day_running,
            cumulative: week_running,
            hours,
        });
    }

    Forecast {
        today: week[0].hours.clone(),
        week,
        cards_due_now,
    }
}
