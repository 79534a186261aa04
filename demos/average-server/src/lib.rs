//! A toy simulation application computing the arithmetical average of a mapped
//! concentration.
//!
//! Each time step a client maps a `PID_Concentration` value onto the
//! application with `set_property`, then calls `solve_step`, which adds the
//! last mapped value to a running sum. `get_property` for
//! `PID_CumulativeConcentration` returns the average over all solved steps.
//!
//! [`AverageClient`] is the typed client side of the same methods.

use mupif_client::Proxy;
use mupif_common::protocol::error::Result;
use mupif_server::{decode_args, Application, ApplicationError, RemoteObject};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

pub const SIGNATURE: &str = "AverageApplication, ver 1.0";

pub mod methods {
    pub const GET_PROPERTY: &str = "get_property";
    pub const SET_PROPERTY: &str = "set_property";
    pub const SOLVE_STEP: &str = "solve_step";
    pub const GET_CRITICAL_TIME_STEP: &str = "get_critical_time_step";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PropertyId {
    #[serde(rename = "PID_Concentration")]
    Concentration,
    #[serde(rename = "PID_CumulativeConcentration")]
    CumulativeConcentration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValueType {
    Scalar,
    Vector,
    Tensor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub value: f64,
    pub property_id: PropertyId,
    pub value_type: ValueType,
    pub time: f64,
    #[serde(default)]
    pub object_id: u32,
}

impl Property {
    pub fn scalar(value: f64, property_id: PropertyId, time: f64) -> Self {
        Self {
            value,
            property_id,
            value_type: ValueType::Scalar,
            time,
            object_id: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeStep {
    pub number: u64,
    pub time: f64,
    pub dt: f64,
}

#[derive(Debug, Deserialize)]
struct GetPropertyArgs {
    property_id: PropertyId,
    time: f64,
    #[serde(default)]
    object_id: u32,
}

#[derive(Debug, Deserialize)]
struct SetPropertyArgs {
    property: Property,
}

#[derive(Debug, Deserialize)]
struct SolveStepArgs {
    tstep: TimeStep,
}

#[derive(Debug, Default)]
pub struct AverageApplication {
    value: f64,
    count: u64,
    contrib: f64,
}

impl AverageApplication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_property(&self, property_id: PropertyId, time: f64, object_id: u32) -> std::result::Result<Property, ApplicationError> {
        match property_id {
            PropertyId::CumulativeConcentration => {
                if self.count == 0 {
                    return Err(ApplicationError::api("No step solved yet"));
                }
                Ok(Property {
                    value: self.value / self.count as f64,
                    property_id,
                    value_type: ValueType::Scalar,
                    time,
                    object_id,
                })
            }
            _ => Err(ApplicationError::api("Unknown property ID")),
        }
    }

    pub fn set_property(&mut self, property: &Property) -> std::result::Result<(), ApplicationError> {
        match property.property_id {
            PropertyId::Concentration => {
                self.contrib = property.value;
                Ok(())
            }
            _ => Err(ApplicationError::api("Unknown property ID")),
        }
    }

    pub fn solve_step(&mut self, tstep: &TimeStep) {
        debug!("Solving step: {} {} {}", tstep.number, tstep.time, tstep.dt);
        self.value += self.contrib;
        self.count += 1;
    }

    pub fn critical_time_step(&self) -> f64 {
        1.0
    }
}

impl RemoteObject for AverageApplication {
    fn dispatch(&mut self, method: &str, args: Value) -> std::result::Result<Value, ApplicationError> {
        match method {
            methods::GET_PROPERTY => {
                let args: GetPropertyArgs = decode_args(args)?;
                let property = self.get_property(args.property_id, args.time, args.object_id)?;
                Ok(serde_json::to_value(property)?)
            }
            methods::SET_PROPERTY => {
                let args: SetPropertyArgs = decode_args(args)?;
                self.set_property(&args.property)?;
                Ok(Value::Null)
            }
            methods::SOLVE_STEP => {
                let args: SolveStepArgs = decode_args(args)?;
                self.solve_step(&args.tstep);
                Ok(Value::Null)
            }
            methods::GET_CRITICAL_TIME_STEP => Ok(json!(self.critical_time_step())),
            other => Err(ApplicationError::UnknownMethod(other.to_string())),
        }
    }
}

impl Application for AverageApplication {
    fn application_signature(&self) -> String {
        SIGNATURE.to_string()
    }
}

/// Typed calls against a remote [`AverageApplication`].
pub struct AverageClient {
    proxy: Proxy,
}

impl AverageClient {
    pub fn new(proxy: Proxy) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn get_property(&self, property_id: PropertyId, time: f64) -> Result<Property> {
        self.proxy
            .call_as(methods::GET_PROPERTY, json!({"property_id": property_id, "time": time}))
    }

    pub fn set_property(&self, property: &Property) -> Result<()> {
        self.proxy
            .call(methods::SET_PROPERTY, json!({"property": property}))
            .map(|_| ())
    }

    pub fn solve_step(&self, tstep: &TimeStep) -> Result<()> {
        self.proxy
            .call(methods::SOLVE_STEP, json!({"tstep": tstep}))
            .map(|_| ())
    }

    pub fn critical_time_step(&self) -> Result<f64> {
        self.proxy.call_as(methods::GET_CRITICAL_TIME_STEP, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(number: u64) -> TimeStep {
        TimeStep {
            number,
            time: number as f64,
            dt: 1.0,
        }
    }

    #[test]
    fn test_average_over_steps() {
        let mut app = AverageApplication::new();
        for (n, value) in [2.0, 4.0, 9.0].into_iter().enumerate() {
            app.set_property(&Property::scalar(value, PropertyId::Concentration, n as f64)).unwrap();
            app.solve_step(&step(n as u64));
        }
        let average = app.get_property(PropertyId::CumulativeConcentration, 3.0, 0).unwrap();
        assert_eq!(average.value, 5.0);
        assert_eq!(average.value_type, ValueType::Scalar);
        assert_eq!(average.time, 3.0);
    }

    #[test]
    fn test_step_reuses_last_mapped_value() {
        let mut app = AverageApplication::new();
        app.set_property(&Property::scalar(3.0, PropertyId::Concentration, 0.0)).unwrap();
        app.solve_step(&step(0));
        app.solve_step(&step(1));
        let average = app.get_property(PropertyId::CumulativeConcentration, 1.0, 0).unwrap();
        assert_eq!(average.value, 3.0);
    }

    #[test]
    fn test_unknown_property_ids() {
        let mut app = AverageApplication::new();
        let err = app
            .set_property(&Property::scalar(1.0, PropertyId::CumulativeConcentration, 0.0))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown property ID");
        app.solve_step(&step(0));
        let err = app.get_property(PropertyId::Concentration, 0.0, 0).unwrap_err();
        assert_eq!(err.to_string(), "Unknown property ID");
    }

    #[test]
    fn test_average_before_any_step_is_an_error() {
        let app = AverageApplication::new();
        assert!(matches!(
            app.get_property(PropertyId::CumulativeConcentration, 0.0, 0),
            Err(ApplicationError::Api(_))
        ));
    }

    #[test]
    fn test_dispatch_wire_names() {
        let mut app = AverageApplication::new();
        app.dispatch(
            methods::SET_PROPERTY,
            json!({"property": {"value": 6.0, "property_id": "PID_Concentration", "value_type": "Scalar", "time": 0.0}}),
        )
        .unwrap();
        app.dispatch(methods::SOLVE_STEP, json!({"tstep": {"number": 1, "time": 1.0, "dt": 1.0}}))
            .unwrap();
        let value = app
            .dispatch(methods::GET_PROPERTY, json!({"property_id": "PID_CumulativeConcentration", "time": 1.0}))
            .unwrap();
        assert_eq!(value["value"], json!(6.0));
        assert_eq!(app.dispatch(methods::GET_CRITICAL_TIME_STEP, Value::Null).unwrap(), json!(1.0));
        assert!(matches!(app.dispatch("run", Value::Null), Err(ApplicationError::UnknownMethod(_))));
    }
}
