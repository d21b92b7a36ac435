//! Equatorial coordinates and epoch conversion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Julian day of J2000.0
const J2000_JD: f64 = 2_451_545.0;
/// Julian day of the Unix epoch
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const DAYS_PER_CENTURY: f64 = 36_525.0;
const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Epoch {
    J2000,
    /// Equinox of date
    JNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub ra_hours: f64,
    pub dec_degrees: f64,
    pub epoch: Epoch,
}

impl Coordinates {
    pub fn new(ra_hours: f64, dec_degrees: f64, epoch: Epoch) -> Self {
        Self { ra_hours, dec_degrees, epoch }
    }

    pub fn j2000(ra_hours: f64, dec_degrees: f64) -> Self {
        Self::new(ra_hours, dec_degrees, Epoch::J2000)
    }

    pub fn jnow(ra_hours: f64, dec_degrees: f64) -> Self {
        Self::new(ra_hours, dec_degrees, Epoch::JNow)
    }

    pub fn ra_degrees(&self) -> f64 {
        self.ra_hours * 15.0
    }

    /// Convert to J2000. `at` is the equinox of date for JNow input.
    pub fn to_j2000(&self, at: DateTime<Utc>) -> Coordinates {
        match self.epoch {
            Epoch::J2000 => *self,
            Epoch::JNow => {
                let (ra, dec) = precess(self.ra_degrees(), self.dec_degrees, julian_day(at), J2000_JD);
                Coordinates::j2000(ra / 15.0, dec)
            }
        }
    }

    /// Convert to the equinox of date `at`
    pub fn to_jnow(&self, at: DateTime<Utc>) -> Coordinates {
        match self.epoch {
            Epoch::JNow => *self,
            Epoch::J2000 => {
                let (ra, dec) = precess(self.ra_degrees(), self.dec_degrees, J2000_JD, julian_day(at));
                Coordinates::jnow(ra / 15.0, dec)
            }
        }
    }

    /// Angular separation in arcseconds
    pub fn separation_arcsec(&self, other: &Coordinates) -> f64 {
        let (ra1, dec1) = (self.ra_degrees().to_radians(), self.dec_degrees.to_radians());
        let (ra2, dec2) = (other.ra_degrees().to_radians(), other.dec_degrees.to_radians());
        let cos_sep = dec1.sin() * dec2.sin() + dec1.cos() * dec2.cos() * (ra1 - ra2).cos();
        cos_sep.clamp(-1.0, 1.0).acos().to_degrees() * 3600.0
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA {:.4}h, Dec {:+.4}° ({:?})", self.ra_hours, self.dec_degrees, self.epoch)
    }
}

pub fn julian_day(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 86_400_000.0 + UNIX_EPOCH_JD
}

/// IAU 1976 precession between two equinoxes (Meeus ch. 21). Degrees in, degrees out.
fn precess(ra_deg: f64, dec_deg: f64, from_jd: f64, to_jd: f64) -> (f64, f64) {
    let big_t = (from_jd - J2000_JD) / DAYS_PER_CENTURY;
    let t = (to_jd - from_jd) / DAYS_PER_CENTURY;
    let (t2, t3) = (t * t, t * t * t);

    let base = 2306.2181 + 1.39656 * big_t - 0.000139 * big_t * big_t;
    let zeta = (base * t + (0.30188 - 0.000344 * big_t) * t2 + 0.017998 * t3) * ARCSEC_TO_RAD;
    let z = (base * t + (1.09468 + 0.000066 * big_t) * t2 + 0.018203 * t3) * ARCSEC_TO_RAD;
    let theta = ((2004.3109 - 0.85330 * big_t - 0.000217 * big_t * big_t) * t
        - (0.42665 + 0.000217 * big_t) * t2
        - 0.041833 * t3)
        * ARCSEC_TO_RAD;

    let ra0 = ra_deg.to_radians();
    let dec0 = dec_deg.to_radians();

    let a = dec0.cos() * (ra0 + zeta).sin();
    let b = theta.cos() * dec0.cos() * (ra0 + zeta).cos() - theta.sin() * dec0.sin();
    let c = theta.sin() * dec0.cos() * (ra0 + zeta).cos() + theta.cos() * dec0.sin();

    let ra = (a.atan2(b) + z).to_degrees().rem_euclid(360.0);
    let dec = c.clamp(-1.0, 1.0).asin().to_degrees();
    (ra, dec)
}
