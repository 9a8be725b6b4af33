// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Low-precision solar position model.
//!
//! Uses the fractional-year Fourier series (Spencer, as published by NOAA)
//! for solar declination and the equation of time, then places the sun's
//! meridian from UTC. Accurate to a few hundredths of a degree, which is far
//! below what a map overlay can show.

use std::f64::consts::PI;

use chrono::{Datelike, Timelike};

use crate::tile::GeoPoint;
use crate::time::Timestamp;

/// Minutes of solar time per degree of longitude.
const MINUTES_PER_DEGREE: f64 = 4.0;

/// Where the sun is at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// Solar declination in degrees (positive north).
    pub declination_deg: f64,
    /// Equation of time in minutes (apparent minus mean solar time).
    pub equation_of_time_min: f64,
    /// The point where the sun is directly overhead.
    pub subsolar: GeoPoint,
}

impl SolarPosition {
    /// Compute the sun's position at `timestamp`.
    #[must_use]
    pub fn at(timestamp: Timestamp) -> Self {
        let datetime = timestamp.as_datetime();

        let hour = f64::from(datetime.hour())
            + f64::from(datetime.minute()) / 60.0
            + (f64::from(datetime.second()) + f64::from(datetime.nanosecond()) / 1e9) / 3600.0;
        let days_in_year = if is_leap_year(datetime.year()) { 366.0 } else { 365.0 };
        let day_of_year = f64::from(datetime.ordinal());

        // Fractional year in radians
        let gamma = 2.0 * PI / days_in_year * (day_of_year - 1.0 + (hour - 12.0) / 24.0);

        let equation_of_time_min = 229.18
            * (0.000_075 + 0.001_868 * gamma.cos()
                - 0.032_077 * gamma.sin()
                - 0.014_615 * (2.0 * gamma).cos()
                - 0.040_849 * (2.0 * gamma).sin());

        let declination_rad = 0.006_918 - 0.399_912 * gamma.cos() + 0.070_257 * gamma.sin()
            - 0.006_758 * (2.0 * gamma).cos()
            + 0.000_907 * (2.0 * gamma).sin()
            - 0.002_697 * (3.0 * gamma).cos()
            + 0.001_48 * (3.0 * gamma).sin();

        // Hour angle is zero where apparent solar time is noon.
        let apparent_solar_hours = hour + equation_of_time_min / 60.0;
        let subsolar_lon = wrap_180(-(apparent_solar_hours - 12.0) * 60.0 / MINUTES_PER_DEGREE);

        Self {
            declination_deg: declination_rad.to_degrees(),
            equation_of_time_min,
            subsolar: GeoPoint::new(declination_rad.to_degrees(), subsolar_lon),
        }
    }

    /// Angular distance from the sub-solar point to `point`, in degrees.
    ///
    /// 0° is the sub-solar point, 90° the geometric terminator, 180° the
    /// anti-solar point.
    #[must_use]
    pub fn zenith_angle_deg(&self, point: &GeoPoint) -> f64 {
        self.subsolar.angular_distance_deg(point)
    }

    /// Geometric solar elevation seen from `point`, in degrees.
    #[must_use]
    pub fn elevation_deg(&self, point: &GeoPoint) -> f64 {
        90.0 - self.zenith_angle_deg(point)
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn wrap_180(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> SolarPosition {
        let datetime = Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap();
        SolarPosition::at(Timestamp::from_datetime(datetime))
    }

    #[test]
    fn test_june_solstice_declination() {
        let sun = at(2024, 6, 20, 12, 0);
        assert!(sun.declination_deg > 23.0 && sun.declination_deg < 23.6, "{}", sun.declination_deg);
    }

    #[test]
    fn test_december_solstice_declination() {
        let sun = at(2024, 12, 21, 12, 0);
        assert!(sun.declination_deg < -23.0 && sun.declination_deg > -23.6, "{}", sun.declination_deg);
    }

    #[test]
    fn test_equinox_declination_near_zero() {
        let sun = at(2024, 3, 20, 12, 0);
        assert!(sun.declination_deg.abs() < 1.0, "{}", sun.declination_deg);
    }

    #[test]
    fn test_equation_of_time_extremes() {
        let november = at(2023, 11, 3, 12, 0);
        assert!(
            november.equation_of_time_min > 15.5 && november.equation_of_time_min < 17.0,
            "{}",
            november.equation_of_time_min
        );

        let february = at(2023, 2, 11, 12, 0);
        assert!(
            february.equation_of_time_min < -13.5 && february.equation_of_time_min > -15.0,
            "{}",
            february.equation_of_time_min
        );
    }

    #[test]
    fn test_subsolar_longitude_follows_utc() {
        let noon = at(2023, 8, 1, 12, 0);
        let expected = -noon.equation_of_time_min / MINUTES_PER_DEGREE;
        assert!((noon.subsolar.lon - expected).abs() < 1e-9);

        let evening = at(2023, 8, 1, 18, 0);
        assert!((evening.subsolar.lon - (-90.0 - evening.equation_of_time_min / 4.0)).abs() < 0.01);

        let morning = at(2023, 8, 1, 6, 0);
        assert!((morning.subsolar.lon - (90.0 - morning.equation_of_time_min / 4.0)).abs() < 0.01);
    }

    #[test]
    fn test_subsolar_latitude_is_declination() {
        let sun = at(2021, 5, 5, 3, 30);
        assert!((sun.subsolar.lat - sun.declination_deg).abs() < 1e-12);
        assert!((-180.0..180.0).contains(&sun.subsolar.lon));
    }

    #[test]
    fn test_elevation_at_subsolar_point() {
        let sun = at(2022, 9, 1, 15, 0);
        assert!((sun.elevation_deg(&sun.subsolar) - 90.0).abs() < 1e-9);
        assert!((sun.elevation_deg(&sun.subsolar.antipode()) + 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_pure_function() {
        let ts = Timestamp::from_millis(1_700_000_000_000).unwrap();
        assert_eq!(SolarPosition::at(ts), SolarPosition::at(ts));
    }

    #[test]
    fn test_wrap_180() {
        assert!((wrap_180(190.0) + 170.0).abs() < 1e-12);
        assert!((wrap_180(-190.0) - 170.0).abs() < 1e-12);
        assert!((wrap_180(540.0) + 180.0).abs() < 1e-12);
    }
}
