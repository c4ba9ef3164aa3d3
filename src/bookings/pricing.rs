use chrono::{DateTime, Utc};

use crate::courts::{resolve_schedule, Timeslot};
use crate::errors::ServiceError;
use crate::promotions::Promotion;

/// The slots a booking covers and what they cost together
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub base_price: i64,
    pub timeslot_ids: Vec<i64>,
}

/// The final price of a booking, all amounts in cents
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Price {
    pub base_price: i64,
    pub discount: i64,
    pub points_redeemed: i64,
    pub total_price: i64,
}

/// Price a booking range with the schedule of its start date.
///
/// The range has to start at the beginning of a slot, end at the end of
/// one, and every slot in between has to follow the previous one without
/// a gap.
pub fn quote(
    slots: &[Timeslot],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Quote, ServiceError> {
    let date = start.naive_utc().date();

    if end.naive_utc().date() != date {
        bad_request!("a booking has to start and end on the same day");
    }

    let mut cursor = start;
    let mut quote = Quote {
        base_price: 0,
        timeslot_ids: Vec::new(),
    };

    for slot in resolve_schedule(slots, date) {
        let (slot_start, slot_end) = slot.occurrence(date);

        if cursor == end {
            break;
        }

        if slot_start != cursor {
            continue;
        }

        if slot_end > end {
            bad_request!("the booking ends in the middle of a timeslot");
        }

        quote.base_price += slot.price;
        quote.timeslot_ids.push(slot.id);
        cursor = slot_end;
    }

    if cursor != end || quote.timeslot_ids.is_empty() {
        bad_request!("the booking has to start and end on the court's timeslots");
    }

    Ok(quote)
}

/// Apply a promotion and redeemed points to a base price.
///
/// 1 point is worth 1 cent, a user can't redeem more than the balance or
/// more than what is left to pay after the discount.
pub fn apply_reductions(
    base_price: i64,
    promotion: Option<&Promotion>,
    requested_points: i64,
    balance: i64,
) -> Result<Price, ServiceError> {
    if requested_points < 0 {
        bad_request!("you can't redeem a negative amount of points");
    }

    if requested_points > balance {
        bad_request!(format!(
            "you only have {} points, you can't redeem {}",
            balance.max(0),
            requested_points
        ));
    }

    let discount = promotion.map_or(0, |promotion| promotion.discount(base_price));
    let remaining = base_price - discount;
    let points_redeemed = requested_points.min(remaining);

    Ok(Price {
        base_price,
        discount,
        points_redeemed,
        total_price: remaining - points_redeemed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::courts::timeslots::tests::{on_date, weekly};
    use crate::promotions::models::tests::promotion;
    use chrono::{NaiveDate, TimeZone};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.ymd(2026, 10, day).and_hms(hour, minute, 0)
    }

    fn saturday_slots() -> Vec<Timeslot> {
        vec![
            weekly(1, 6, (9, 0), (10, 0), 1500),
            weekly(2, 6, (10, 0), (11, 0), 1500),
            weekly(3, 6, (11, 0), (12, 0), 2000),
            // a gap for lunch
            weekly(4, 6, (13, 0), (14, 0), 1800),
        ]
    }

    #[test]
    fn single_slot() {
        let quote = quote(&saturday_slots(), at(24, 9, 0), at(24, 10, 0)).unwrap();
        assert_eq!(quote.base_price, 1500);
        assert_eq!(quote.timeslot_ids, vec![1]);
    }

    #[test]
    fn contiguous_slots_add_up() {
        let quote = quote(&saturday_slots(), at(24, 10, 0), at(24, 12, 0)).unwrap();
        assert_eq!(quote.base_price, 3500);
        assert_eq!(quote.timeslot_ids, vec![2, 3]);
    }

    #[test]
    fn misaligned_ranges_are_rejected() {
        let slots = saturday_slots();
        // starts in the middle of a slot
        assert!(quote(&slots, at(24, 9, 30), at(24, 11, 0)).is_err());
        // ends in the middle of a slot
        assert!(quote(&slots, at(24, 9, 0), at(24, 10, 30)).is_err());
        // spans the lunch gap
        assert!(quote(&slots, at(24, 11, 0), at(24, 14, 0)).is_err());
        // no slots on fridays
        assert!(quote(&slots, at(23, 9, 0), at(23, 10, 0)).is_err());
    }

    #[test]
    fn specific_dates_override_the_weekly_schedule() {
        let mut slots = saturday_slots();
        let date = NaiveDate::from_ymd(2026, 10, 31);
        slots.push(on_date(9, date, (9, 0), (11, 0), 5000));

        let quote = quote(&slots, at(31, 9, 0), at(31, 11, 0)).unwrap();
        assert_eq!(quote.base_price, 5000);
        assert_eq!(quote.timeslot_ids, vec![9]);

        // the weekly slots still apply on other saturdays
        assert!(super::quote(&slots, at(24, 9, 0), at(24, 10, 0)).is_ok());
    }

    #[test]
    fn no_reductions() {
        let price = apply_reductions(3000, None, 0, 0).unwrap();
        assert_eq!(
            price,
            Price {
                base_price: 3000,
                discount: 0,
                points_redeemed: 0,
                total_price: 3000,
            }
        );
    }

    #[test]
    fn promotion_then_points() {
        let promotion = promotion(Some(10), None);
        let price = apply_reductions(3000, Some(&promotion), 500, 800).unwrap();

        assert_eq!(price.discount, 300);
        assert_eq!(price.points_redeemed, 500);
        assert_eq!(price.total_price, 2200);
    }

    #[test]
    fn points_are_capped_at_the_remaining_price() {
        let promotion = promotion(None, Some(1000));
        let price = apply_reductions(1500, Some(&promotion), 900, 900).unwrap();

        assert_eq!(price.discount, 1000);
        assert_eq!(price.points_redeemed, 500);
        assert_eq!(price.total_price, 0);
    }

    #[test]
    fn points_above_the_balance_are_rejected() {
        assert!(apply_reductions(3000, None, 100, 99).is_err());
        assert!(apply_reductions(3000, None, -1, 100).is_err());
    }
}
