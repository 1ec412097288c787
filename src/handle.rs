//! Proxies for objects living in the plotting process

use std::fmt;
use std::str::FromStr;

use crate::codec::{CommandOptions, Invocation, Value};
use crate::error::{Error, Result};
use crate::events::EventSubscription;
use crate::session::Session;

/// Kind of a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Plot,
    Curve,
    Vector,
    Scalar,
    Equation,
    Spectrum,
    CrossSpectrum,
    Histogram,
    SumFilter,
    Circle,
    Button,
    LineEdit,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 12] = [
        ObjectKind::Plot,
        ObjectKind::Curve,
        ObjectKind::Vector,
        ObjectKind::Scalar,
        ObjectKind::Equation,
        ObjectKind::Spectrum,
        ObjectKind::CrossSpectrum,
        ObjectKind::Histogram,
        ObjectKind::SumFilter,
        ObjectKind::Circle,
        ObjectKind::Button,
        ObjectKind::LineEdit,
    ];

    /// Command namespace, as in `vector.values`
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Plot => "plot",
            ObjectKind::Curve => "curve",
            ObjectKind::Vector => "vector",
            ObjectKind::Scalar => "scalar",
            ObjectKind::Equation => "equation",
            ObjectKind::Spectrum => "spectrum",
            ObjectKind::CrossSpectrum => "cross_spectrum",
            ObjectKind::Histogram => "histogram",
            ObjectKind::SumFilter => "sum_filter",
            ObjectKind::Circle => "circle",
            ObjectKind::Button => "button",
            ObjectKind::LineEdit => "line_edit",
        }
    }

    /// Data objects that expose derived `x`/`y` output vectors
    pub fn has_xy_outputs(&self) -> bool {
        matches!(
            self,
            ObjectKind::Equation
                | ObjectKind::Spectrum
                | ObjectKind::CrossSpectrum
                | ObjectKind::Histogram
        )
    }

    /// Widgets that can be subscribed to
    pub fn is_widget(&self) -> bool {
        matches!(self, ObjectKind::Button | ObjectKind::LineEdit)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Protocol(format!("unknown object kind '{s}'")))
    }
}

/// A remote object owned by the plotting process
///
/// Every method is a round trip; nothing is cached on this side. The handle
/// only works while its session is connected.
#[derive(Debug, Clone)]
pub struct Handle<'s> {
    session: &'s Session,
    id: String,
    kind: ObjectKind,
}

impl<'s> Handle<'s> {
    pub(crate) fn new(session: &'s Session, id: String, kind: ObjectKind) -> Self {
        Self { session, id, kind }
    }

    /// Remote identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Whether the owning session is still connected
    pub fn is_valid(&self) -> bool {
        self.session.is_connected()
    }

    /// Call `<kind>.<method>` with this object's id as first argument
    pub fn call(&self, method: &str, args: impl IntoIterator<Item = Value>) -> Result<Value> {
        self.invoke(self.invocation(method).args(args))
    }

    /// Like `call`, with typed options attached
    pub fn call_with(
        &self,
        method: &str,
        args: impl IntoIterator<Item = Value>,
        options: &impl CommandOptions,
    ) -> Result<Value> {
        self.invoke(self.invocation(method).args(args).options(options))
    }

    fn invocation(&self, method: &str) -> Invocation {
        Invocation::new(format!("{}.{method}", self.kind)).arg(self.id.as_str())
    }

    fn invoke(&self, invocation: Invocation) -> Result<Value> {
        if !self.is_valid() {
            return Err(Error::StaleHandle {
                id: self.id.clone(),
            });
        }
        self.session.invoke(invocation)
    }

    fn expect_kind(&self, expected: ObjectKind) -> Result<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(Error::WrongKind {
                id: self.id.clone(),
                expected,
                found: self.kind,
            })
        }
    }

    /// Call a method that answers with the id of another object
    fn call_for_handle(
        &self,
        method: &str,
        args: Vec<Value>,
        kind: ObjectKind,
    ) -> Result<Handle<'s>> {
        let command = format!("{}.{method}", self.kind);
        let value = self.call(method, args)?;
        self.session.handle_from(&command, value, kind)
    }

    pub fn set_color(&self, color: &str) -> Result<()> {
        self.call("set_color", [Value::from(color)]).map(drop)
    }

    pub fn set_line_width(&self, width: u32) -> Result<()> {
        self.call("set_line_width", [Value::from(width)]).map(drop)
    }

    pub fn set_stroke_width(&self, width: f64) -> Result<()> {
        self.call("set_stroke_width", [Value::from(width)]).map(drop)
    }

    pub fn set_has_bars(&self, enabled: bool) -> Result<()> {
        self.call("set_has_bars", [Value::from(enabled)]).map(drop)
    }

    pub fn set_has_lines(&self, enabled: bool) -> Result<()> {
        self.call("set_has_lines", [Value::from(enabled)]).map(drop)
    }

    pub fn set_bar_fill_color(&self, color: &str) -> Result<()> {
        self.call("set_bar_fill_color", [Value::from(color)]).map(drop)
    }

    /// Descriptive name the plotting process shows for this object
    pub fn name(&self) -> Result<String> {
        let command = format!("{}.name", self.kind);
        let value = self.call("name", [])?;
        let found = value.type_name();
        value.into_string().ok_or(Error::UnexpectedResult {
            command,
            expected: "string",
            found,
        })
    }

    /// Put a curve (or other plottable) into this plot
    ///
    /// `item` must come from the same session as the plot.
    pub fn add(&self, item: &Handle<'_>) -> Result<()> {
        self.expect_kind(ObjectKind::Plot)?;
        let item = self.session.owned_arg(item)?;
        self.call("add", [item]).map(drop)
    }

    /// Read the whole vector
    pub fn values(&self) -> Result<Vec<f64>> {
        self.expect_kind(ObjectKind::Vector)?;
        let value = self.call("values", [])?;
        let found = value.type_name();
        value.into_floats().ok_or(Error::UnexpectedResult {
            command: "vector.values".to_string(),
            expected: "float array",
            found,
        })
    }

    /// Replace the whole vector
    pub fn load(&self, values: &[f64]) -> Result<()> {
        self.expect_kind(ObjectKind::Vector)?;
        self.call("load", [Value::from(values)]).map(drop)
    }

    /// Number of samples in the vector
    pub fn len(&self) -> Result<usize> {
        self.expect_kind(ObjectKind::Vector)?;
        let value = self.call("length", [])?;
        value
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(Error::UnexpectedResult {
                command: "vector.length".to_string(),
                expected: "non-negative int",
                found: value.type_name(),
            })
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Output X vector of an equation, spectrum or histogram
    pub fn x(&self) -> Result<Handle<'s>> {
        self.output_axis("x")
    }

    /// Output Y vector of an equation, spectrum or histogram
    pub fn y(&self) -> Result<Handle<'s>> {
        self.output_axis("y")
    }

    fn output_axis(&self, axis: &str) -> Result<Handle<'s>> {
        if !self.kind.has_xy_outputs() {
            return Err(Error::WrongKind {
                id: self.id.clone(),
                expected: ObjectKind::Equation,
                found: self.kind,
            });
        }
        self.call_for_handle(axis, Vec::new(), ObjectKind::Vector)
    }

    /// Running sum output of a sum filter
    pub fn output_sum(&self) -> Result<Handle<'s>> {
        self.expect_kind(ObjectKind::SumFilter)?;
        self.call_for_handle("output", vec![Value::from("sum")], ObjectKind::Vector)
    }

    /// Listen for interactions with this button or line edit
    pub fn subscribe(
        &self,
        callback: impl FnMut(&[u8]) -> Result<()> + 's,
    ) -> Result<EventSubscription<'s>> {
        if !self.kind.is_widget() {
            return Err(Error::WrongKind {
                id: self.id.clone(),
                expected: ObjectKind::Button,
                found: self.kind,
            });
        }
        if !self.is_valid() {
            return Err(Error::StaleHandle {
                id: self.id.clone(),
            });
        }
        self.session.subscribe(&self.id, callback)
    }

    /// Delete the remote object
    pub fn delete(self) -> Result<()> {
        self.call("delete", []).map(drop)
    }
}

impl From<&Handle<'_>> for Value {
    fn from(handle: &Handle<'_>) -> Self {
        Value::Str(handle.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ObjectKind::ALL {
            assert_eq!(kind.as_str().parse::<ObjectKind>().unwrap(), kind);
        }
        assert!("teapot".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn test_kind_categories() {
        assert!(ObjectKind::Histogram.has_xy_outputs());
        assert!(!ObjectKind::Vector.has_xy_outputs());
        assert!(ObjectKind::LineEdit.is_widget());
        assert!(!ObjectKind::Plot.is_widget());
    }
}
