use std::fmt;

use serde::Serialize;

/// An unsigned EXIF rational, kept exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `None` for a zero denominator.
    pub fn to_f64(self) -> Option<f64> {
        (self.denominator != 0).then(|| f64::from(self.numerator) / f64::from(self.denominator))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_f64() {
            Some(_) if self.denominator == 1 => write!(f, "{}", self.numerator),
            Some(v) => write!(f, "{}", (v * 1000.0).round() / 1000.0),
            None => write!(f, "{}/{}", self.numerator, self.denominator),
        }
    }
}

/// Degrees, minutes and seconds of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dms {
    pub degrees: Rational,
    pub minutes: Rational,
    pub seconds: Rational,
}

impl Dms {
    pub fn to_degrees(&self) -> Option<f64> {
        Some(
            self.degrees.to_f64()?
                + self.minutes.to_f64()? / 60.0
                + self.seconds.to_f64()? / 3600.0,
        )
    }
}

/// GPS position read from EXIF. Read-only; never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub latitude_ref: char,
    pub latitude: Dms,
    pub longitude_ref: char,
    pub longitude: Dms,
}

impl Location {
    /// Signed latitude, negative in the southern hemisphere. `None` when the reference
    /// is neither N nor S or a rational has a zero denominator.
    pub fn latitude_degrees_north(&self) -> Option<f64> {
        let value = self.latitude.to_degrees()?;
        match self.latitude_ref.to_ascii_uppercase() {
            'N' => Some(value),
            'S' => Some(-value),
            _ => None,
        }
    }

    /// Signed longitude, negative west of Greenwich.
    pub fn longitude_degrees_east(&self) -> Option<f64> {
        let value = self.longitude.to_degrees()?;
        match self.longitude_ref.to_ascii_uppercase() {
            'E' => Some(value),
            'W' => Some(-value),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[GPS. Latitude: {} degrees, {} minutes, {} seconds {}, \
             Longitude: {} degrees, {} minutes, {} seconds {}]",
            self.latitude.degrees,
            self.latitude.minutes,
            self.latitude.seconds,
            self.latitude_ref,
            self.longitude.degrees,
            self.longitude.minutes,
            self.longitude.seconds,
            self.longitude_ref,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dms(d: (u32, u32), m: (u32, u32), s: (u32, u32)) -> Dms {
        Dms {
            degrees: Rational::new(d.0, d.1),
            minutes: Rational::new(m.0, m.1),
            seconds: Rational::new(s.0, s.1),
        }
    }

    fn bali() -> Location {
        Location {
            latitude_ref: 'S',
            latitude: dms((8, 1), (40, 1), (422, 10)),
            longitude_ref: 'E',
            longitude: dms((115, 1), (26, 1), (218, 10)),
        }
    }

    #[test]
    fn signed_degrees_follow_references() {
        let loc = bali();
        let lat = loc.latitude_degrees_north().unwrap();
        let lon = loc.longitude_degrees_east().unwrap();
        assert!((lat + 8.678_388).abs() < 1e-5);
        assert!((lon - 115.439_388).abs() < 1e-5);
    }

    #[test]
    fn unknown_reference_or_zero_denominator_gives_none() {
        let mut loc = bali();
        loc.latitude_ref = '?';
        assert_eq!(loc.latitude_degrees_north(), None);

        let mut loc = bali();
        loc.longitude.seconds = Rational::new(1, 0);
        assert_eq!(loc.longitude_degrees_east(), None);
    }

    #[test]
    fn display_reads_like_a_gps_line() {
        assert_eq!(
            bali().to_string(),
            "[GPS. Latitude: 8 degrees, 40 minutes, 42.2 seconds S, \
             Longitude: 115 degrees, 26 minutes, 21.8 seconds E]"
        );
    }
}
