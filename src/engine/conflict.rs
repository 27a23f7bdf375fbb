use crate::limits::*;
use crate::model::*;

use super::BookingError;

/// Trim and bound the customer's name, phone and notes.
pub(crate) fn validate_customer(
    customer: &Customer,
    notes: Option<&str>,
) -> Result<(Customer, Option<String>), BookingError> {
    let name = customer.name.trim();
    if name.is_empty() {
        return Err(BookingError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(BookingError::Validation("name too long".into()));
    }

    let phone = customer.phone.trim();
    if phone.is_empty() {
        return Err(BookingError::Validation("phone is required".into()));
    }
    if phone.len() > MAX_PHONE_LEN {
        return Err(BookingError::Validation("phone too long".into()));
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
    {
        return Err(BookingError::Validation("phone contains invalid characters".into()));
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return Err(BookingError::Validation(format!(
            "phone must have {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits"
        )));
    }

    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    if let Some(n) = notes
        && n.chars().count() > MAX_NOTES_LEN
    {
        return Err(BookingError::Validation("notes too long".into()));
    }

    Ok((
        Customer {
            name: name.to_string(),
            phone: phone.to_string(),
        },
        notes.map(str::to_string),
    ))
}

/// The requested range must sit inside one allowed range.
pub(crate) fn validate_range(range: &SlotRange, allowed: &[SlotRange]) -> Result<(), BookingError> {
    if range.start < 0 || range.end > SLOTS_PER_DAY {
        return Err(BookingError::Validation(format!(
            "start {} out of the day",
            range.start
        )));
    }
    if !allowed.iter().any(|a| a.contains_range(range)) {
        return Err(BookingError::Validation(format!(
            "{} is outside the barber's working hours",
            slot_to_time(range.start)
        )));
    }
    Ok(())
}

/// Best-effort re-check against the rows just read. The claim that follows is
/// what actually settles a race.
pub(crate) fn check_no_conflict(slots: &[TimeSlot], range: &SlotRange) -> Result<(), BookingError> {
    match slots
        .iter()
        .find(|s| s.is_occupied && s.span().overlaps(range))
    {
        Some(_) => Err(BookingError::SlotConflict(range.start)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn customer(name: &str, phone: &str) -> Customer {
        Customer {
            name: name.into(),
            phone: phone.into(),
        }
    }

    #[test]
    fn customer_fields_trimmed() {
        let (c, notes) =
            validate_customer(&customer("  Ana Souza ", " (11) 98765-4321 "), Some("  degradê  ")).unwrap();
        assert_eq!(c.name, "Ana Souza");
        assert_eq!(c.phone, "(11) 98765-4321");
        assert_eq!(notes.as_deref(), Some("degradê"));
    }

    #[test]
    fn blank_notes_dropped() {
        let (_, notes) = validate_customer(&customer("Ana", "11987654321"), Some("   ")).unwrap();
        assert_eq!(notes, None);
    }

    #[test]
    fn missing_fields_rejected() {
        assert!(matches!(
            validate_customer(&customer("  ", "11987654321"), None),
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            validate_customer(&customer("Ana", ""), None),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn bad_phones_rejected() {
        for phone in ["1234", "11 9876x4321", "1234567890123456789"] {
            assert!(
                matches!(validate_customer(&customer("Ana", phone), None), Err(BookingError::Validation(_))),
                "{phone} accepted"
            );
        }
    }

    #[test]
    fn long_notes_rejected() {
        let notes = "x".repeat(MAX_NOTES_LEN + 1);
        assert!(matches!(
            validate_customer(&customer("Ana", "11987654321"), Some(&notes)),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn range_must_fit_window() {
        let allowed = vec![SlotRange::new(108, 216)];
        assert!(validate_range(&SlotRange::new(108, 114), &allowed).is_ok());
        assert!(validate_range(&SlotRange::new(210, 216), &allowed).is_ok());
        assert!(validate_range(&SlotRange::new(212, 218), &allowed).is_err());
        assert!(validate_range(&SlotRange::new(100, 106), &allowed).is_err());
        assert!(validate_range(&SlotRange::new(286, 290), &[SlotRange::new(0, 300)]).is_err());
    }

    #[test]
    fn occupied_overlap_conflicts() {
        let slots = vec![TimeSlot {
            id: Ulid::new(),
            barber_id: Ulid::new(),
            date_id: Ulid::new(),
            slot_start: 120,
            slot_size: 6,
            is_occupied: true,
        }];
        assert_eq!(
            check_no_conflict(&slots, &SlotRange::new(118, 121)),
            Err(BookingError::SlotConflict(118))
        );
        assert!(check_no_conflict(&slots, &SlotRange::new(126, 130)).is_ok());
        assert!(check_no_conflict(&slots, &SlotRange::new(114, 120)).is_ok());
    }
}
