use chrono::{DateTime, Utc};
use rand::Rng;

const PREFIX: &str = "SRTA";

/// `SRTA-YYYYMMDD-NNNNN`, customer facing.
pub fn booking_code<R: Rng + ?Sized>(date: DateTime<Utc>, rng: &mut R) -> String {
    let serial: u32 = rng.gen_range(0..100_000);
    format!("{PREFIX}-{}-{serial:05}", date.format("%Y%m%d"))
}

pub fn random_booking_code(date: DateTime<Utc>) -> String {
    booking_code(date, &mut rand::thread_rng())
}

pub fn is_booking_code(raw: &str) -> bool {
    let mut parts = raw.split('-');
    let (Some(prefix), Some(date), Some(serial), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    prefix == PREFIX
        && date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && serial.len() == 5
        && serial.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{booking_code, is_booking_code};

    #[test]
    fn code_carries_date_and_five_digits() {
        let date = Utc.with_ymd_and_hms(2026, 3, 7, 10, 30, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let code = booking_code(date, &mut rng);
            assert!(code.starts_with("SRTA-20260307-"), "{code}");
            assert!(is_booking_code(&code), "{code}");
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(!is_booking_code("SRTA-2026037-12345"));
        assert!(!is_booking_code("SRTA-20260307-1234"));
        assert!(!is_booking_code("INV-20260307-12345"));
        assert!(!is_booking_code("SRTA-20260307-12345-1"));
        assert!(!is_booking_code("SRTA-2026O307-12345"));
    }
}
