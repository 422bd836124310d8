// pf-core/src/units.rs
//
// Physical state is stored in SI (Pa, K, m³/s). Controllers and sensors work
// in engineering units (bar, °C, m³/h).

use uom::si::f64::{
    Length as UomLength, Pressure as UomPressure,
    ThermodynamicTemperature as UomThermodynamicTemperature, Time as UomTime,
    VolumeRate as UomVolumeRate,
};
use uom::si::pressure::{bar as bar_unit, pascal};
use uom::si::thermodynamic_temperature::{degree_celsius, kelvin};
use uom::si::volume_rate::{cubic_meter_per_hour, cubic_meter_per_second};

pub type Length = UomLength;
pub type Pressure = UomPressure;
pub type Temperature = UomThermodynamicTemperature;
pub type Time = UomTime;
pub type VolumeRate = UomVolumeRate;

#[inline]
pub fn pa(v: f64) -> Pressure {
    Pressure::new::<pascal>(v)
}

#[inline]
pub fn bar(v: f64) -> Pressure {
    Pressure::new::<bar_unit>(v)
}

#[inline]
pub fn k(v: f64) -> Temperature {
    Temperature::new::<kelvin>(v)
}

#[inline]
pub fn degc(v: f64) -> Temperature {
    Temperature::new::<degree_celsius>(v)
}

#[inline]
pub fn m(v: f64) -> Length {
    use uom::si::length::meter;
    Length::new::<meter>(v)
}

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

#[inline]
pub fn m3ps(v: f64) -> VolumeRate {
    VolumeRate::new::<cubic_meter_per_second>(v)
}

#[inline]
pub fn m3ph(v: f64) -> VolumeRate {
    VolumeRate::new::<cubic_meter_per_hour>(v)
}

/// Pa → bar.
#[inline]
pub fn pa_to_bar(v: f64) -> f64 {
    pa(v).get::<bar_unit>()
}

/// bar → Pa.
#[inline]
pub fn bar_to_pa(v: f64) -> f64 {
    bar(v).get::<pascal>()
}

/// K → °C.
#[inline]
pub fn k_to_degc(v: f64) -> f64 {
    k(v).get::<degree_celsius>()
}

/// °C → K.
#[inline]
pub fn degc_to_k(v: f64) -> f64 {
    degc(v).get::<kelvin>()
}

/// m³/s → m³/h.
#[inline]
pub fn m3ps_to_m3ph(v: f64) -> f64 {
    m3ps(v).get::<cubic_meter_per_hour>()
}

/// m³/h → m³/s.
#[inline]
pub fn m3ph_to_m3ps(v: f64) -> f64 {
    m3ph(v).get::<cubic_meter_per_second>()
}

pub mod constants {
    /// Standard reference pressure (Pa).
    pub const P_STD_PA: f64 = 101_325.0;

    /// Default ambient ground temperature (K), 15 °C.
    pub const T_AMBIENT_K: f64 = 288.15;
}
