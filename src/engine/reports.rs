use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::{Driver, DriverStatus};

const RECENT_WINDOW_DAYS: i64 = 7;
const TOP_DRIVERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub overview: Overview,
    pub bookings: BookingCounts,
    pub drivers: DriverCounts,
    pub revenue: RevenueTotals,
    pub top_drivers: Vec<TopDriver>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_customers: usize,
    pub total_drivers: usize,
    pub verified_drivers: usize,
    pub total_bookings: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BookingCounts {
    pub pending: usize,
    pub ongoing: usize,
    pub completed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DriverCounts {
    pub available: usize,
    pub busy: usize,
    pub offline: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueTotals {
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
    pub driver_earnings: Decimal,
    pub recent_bookings: usize,
    pub recent_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopDriver {
    pub driver_id: Uuid,
    pub user_id: Uuid,
    pub total_trips: u32,
    pub rating: f64,
    pub total_earnings: Decimal,
}

pub fn dashboard(bookings: &[Booking], drivers: &[Driver], now: DateTime<Utc>) -> Dashboard {
    let week_ago = now - Duration::days(RECENT_WINDOW_DAYS);

    let mut counts = BookingCounts::default();
    let mut total_revenue = Decimal::ZERO;
    let mut total_commission = Decimal::ZERO;
    let mut driver_earnings = Decimal::ZERO;
    let mut recent_bookings = 0;
    let mut recent_revenue = Decimal::ZERO;
    let mut customers = HashSet::new();

    for booking in bookings {
        customers.insert(booking.customer_id);
        let recent = booking.created_at >= week_ago;
        if recent {
            recent_bookings += 1;
        }

        match booking.status {
            BookingStatus::Pending => counts.pending += 1,
            BookingStatus::Cancelled => counts.cancelled += 1,
            BookingStatus::Completed => {
                counts.completed += 1;
                total_revenue += booking.revenue();
                total_commission += booking.commission.unwrap_or_default();
                driver_earnings += booking.driver_earning.unwrap_or_default();
                if recent {
                    recent_revenue += booking.revenue();
                }
            }
            status if status.is_in_progress() => counts.ongoing += 1,
            _ => {}
        }
    }

    let driver_counts = DriverCounts {
        available: drivers
            .iter()
            .filter(|d| d.is_verified && d.status == DriverStatus::Available)
            .count(),
        busy: drivers.iter().filter(|d| d.status == DriverStatus::Busy).count(),
        offline: drivers.iter().filter(|d| d.status == DriverStatus::Offline).count(),
    };

    let mut ranked: Vec<&Driver> = drivers.iter().collect();
    ranked.sort_by(|a, b| b.total_trips.cmp(&a.total_trips).then_with(|| a.id.cmp(&b.id)));
    let top_drivers = ranked
        .into_iter()
        .take(TOP_DRIVERS)
        .map(|d| TopDriver {
            driver_id: d.id,
            user_id: d.user_id,
            total_trips: d.total_trips,
            rating: d.rating,
            total_earnings: d.total_earnings,
        })
        .collect();

    Dashboard {
        overview: Overview {
            total_customers: customers.len(),
            total_drivers: drivers.len(),
            verified_drivers: drivers.iter().filter(|d| d.is_verified).count(),
            total_bookings: bookings.len(),
        },
        bookings: counts,
        drivers: driver_counts,
        revenue: RevenueTotals {
            total_revenue: total_revenue.normalize(),
            total_commission: total_commission.normalize(),
            driver_earnings: driver_earnings.normalize(),
            recent_bookings,
            recent_revenue: recent_revenue.normalize(),
        },
        top_drivers,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueReport {
    pub summary: RevenueSummary,
    pub daily_breakdown: BTreeMap<NaiveDate, DailyRevenue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub total_bookings: usize,
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
    pub total_driver_earnings: Decimal,
    pub average_fare: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DailyRevenue {
    pub bookings: usize,
    pub revenue: Decimal,
    pub commission: Decimal,
}

/// Revenue over completed bookings whose drop time falls inside the
/// inclusive range. Bookings without a drop time count towards the summary
/// only when no range is given, and never appear in the daily breakdown.
pub fn revenue_report(
    bookings: &[Booking],
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> RevenueReport {
    let in_range = |booking: &&Booking| {
        if booking.status != BookingStatus::Completed {
            return false;
        }
        match booking.drop_time {
            Some(at) => from.is_none_or(|from| at >= from) && to.is_none_or(|to| at <= to),
            None => from.is_none() && to.is_none(),
        }
    };

    let mut total_revenue = Decimal::ZERO;
    let mut total_commission = Decimal::ZERO;
    let mut total_bookings = 0usize;
    let mut daily_breakdown: BTreeMap<NaiveDate, DailyRevenue> = BTreeMap::new();

    for booking in bookings.iter().filter(in_range) {
        let revenue = booking.revenue();
        let commission = booking.commission.unwrap_or_default();
        total_bookings += 1;
        total_revenue += revenue;
        total_commission += commission;

        if let Some(dropped) = booking.drop_time {
            let day = daily_breakdown.entry(dropped.date_naive()).or_default();
            day.bookings += 1;
            day.revenue += revenue;
            day.commission += commission;
        }
    }

    for day in daily_breakdown.values_mut() {
        day.revenue = day.revenue.normalize();
        day.commission = day.commission.normalize();
    }

    let average_fare = if total_bookings == 0 {
        Decimal::ZERO
    } else {
        (total_revenue / Decimal::from(total_bookings)).round_dp(2).normalize()
    };

    RevenueReport {
        summary: RevenueSummary {
            total_bookings,
            total_revenue: total_revenue.normalize(),
            total_commission: total_commission.normalize(),
            total_driver_earnings: (total_revenue - total_commission).normalize(),
            average_fare,
        },
        daily_breakdown,
    }
}
