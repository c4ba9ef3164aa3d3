use chrono::{DateTime, NaiveDate, Utc};

use crate::courts::{resolve_schedule, Timeslot};

/// A resolved timeslot on a specific date
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SlotAvailability {
    pub timeslot_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price: i64,
    pub available: bool,
}

/// half-open ranges `[start, end)`, touching ranges don't overlap
pub fn overlaps(
    a: (DateTime<Utc>, DateTime<Utc>),
    b: (DateTime<Utc>, DateTime<Utc>),
) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Mark the schedule of a date as available or taken.
///
/// `booked` holds the ranges of the active bookings of the court, a
/// slot that already started can't be booked anymore either.
pub fn availability(
    slots: &[Timeslot],
    booked: &[(DateTime<Utc>, DateTime<Utc>)],
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<SlotAvailability> {
    resolve_schedule(slots, date)
        .into_iter()
        .map(|slot| {
            let range = slot.occurrence(date);
            let taken = booked.iter().any(|booking| overlaps(range, *booking));

            SlotAvailability {
                timeslot_id: slot.id,
                start_time: range.0,
                end_time: range.1,
                price: slot.price,
                available: !taken && range.0 > now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::courts::timeslots::tests::weekly;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.ymd(2026, 10, 24).and_hms(hour, minute, 0)
    }

    fn saturday_slots() -> Vec<Timeslot> {
        vec![
            weekly(1, 6, (9, 0), (10, 0), 1500),
            weekly(2, 6, (10, 0), (11, 0), 1500),
            weekly(3, 6, (11, 0), (12, 0), 2000),
        ]
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        assert!(!overlaps((at(9, 0), at(10, 0)), (at(10, 0), at(11, 0))));
        assert!(overlaps((at(9, 0), at(10, 1)), (at(10, 0), at(11, 0))));
        assert!(overlaps((at(9, 0), at(12, 0)), (at(10, 0), at(11, 0))));
    }

    #[test]
    fn everything_is_free_without_bookings() {
        let date = NaiveDate::from_ymd(2026, 10, 24);
        let slots = availability(&saturday_slots(), &[], date, at(0, 0));

        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|slot| slot.available));
        assert_eq!(slots[2].price, 2000);
        assert_eq!(slots[0].start_time, at(9, 0));
    }

    #[test]
    fn booked_slots_are_taken() {
        let date = NaiveDate::from_ymd(2026, 10, 24);
        // one booking that spans the first two slots
        let booked = vec![(at(9, 0), at(11, 0))];

        let slots = availability(&saturday_slots(), &booked, date, at(0, 0));
        let free: Vec<bool> = slots.iter().map(|slot| slot.available).collect();

        assert_eq!(free, vec![false, false, true]);
    }

    #[test]
    fn started_slots_are_taken() {
        let date = NaiveDate::from_ymd(2026, 10, 24);

        let slots = availability(&saturday_slots(), &[], date, at(10, 0));
        let free: Vec<bool> = slots.iter().map(|slot| slot.available).collect();

        assert_eq!(free, vec![false, false, true]);
    }

    #[test]
    fn other_days_have_no_schedule() {
        let friday = NaiveDate::from_ymd(2026, 10, 23);
        assert!(availability(&saturday_slots(), &[], friday, at(0, 0)).is_empty());
    }
}
