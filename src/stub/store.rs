//! Object table of the stub plotting process

use std::collections::{BTreeMap, HashMap};

use crate::codec::{RemoteFault, Value};
use crate::handle::ObjectKind;

use super::analysis;
use super::expr::Expression;

pub(crate) type Outcome = Result<Value, RemoteFault>;

fn invalid(message: impl Into<String>) -> RemoteFault {
    RemoteFault::new(RemoteFault::INVALID_ARGUMENT, message)
}

/// Positional argument `index` of `command`
pub(crate) fn arg<'a>(
    command: &str,
    args: &'a [Value],
    index: usize,
) -> Result<&'a Value, RemoteFault> {
    args.get(index)
        .ok_or_else(|| invalid(format!("{command}: missing argument {}", index + 1)))
}

pub(crate) fn arg_str<'a>(
    command: &str,
    args: &'a [Value],
    index: usize,
) -> Result<&'a str, RemoteFault> {
    let value = arg(command, args, index)?;
    value.as_str().ok_or_else(|| {
        invalid(format!(
            "{command}: argument {} must be a string, got {}",
            index + 1,
            value.type_name()
        ))
    })
}

pub(crate) fn arg_f64(command: &str, args: &[Value], index: usize) -> Result<f64, RemoteFault> {
    let value = arg(command, args, index)?;
    value.as_f64().ok_or_else(|| {
        invalid(format!(
            "{command}: argument {} must be a number, got {}",
            index + 1,
            value.type_name()
        ))
    })
}

/// Float samples carried either as a bulk array or as a list of numbers
pub(crate) fn float_samples(command: &str, value: &Value) -> Result<Vec<f64>, RemoteFault> {
    match value {
        Value::Floats(v) => Ok(v.clone()),
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_f64()
                    .ok_or_else(|| invalid(format!("{command}: list holds a {}", item.type_name())))
            })
            .collect(),
        other => Err(invalid(format!(
            "{command}: expected float array, got {}",
            other.type_name()
        ))),
    }
}

/// Named options of one request
pub(crate) struct Options<'a>(pub &'a [(String, Value)]);

impl Options<'_> {
    fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn f64(&self, name: &str, default: f64) -> Result<f64, RemoteFault> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| invalid(format!("option '{name}' must be a number"))),
        }
    }

    pub fn int(&self, name: &str, default: i64) -> Result<i64, RemoteFault> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_i64()
                .ok_or_else(|| invalid(format!("option '{name}' must be an integer"))),
        }
    }

    pub fn bool(&self, name: &str, default: bool) -> Result<bool, RemoteFault> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| invalid(format!("option '{name}' must be a boolean"))),
        }
    }

    pub fn str<'v>(&'v self, name: &str, default: &'v str) -> Result<&'v str, RemoteFault> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_str()
                .ok_or_else(|| invalid(format!("option '{name}' must be a string"))),
        }
    }
}

#[derive(Debug)]
pub(crate) struct StoredObject {
    pub kind: ObjectKind,
    pub name: Option<String>,
    pub properties: BTreeMap<String, Value>,
    /// Samples of a vector
    pub values: Vec<f64>,
    /// Derived vectors by output name
    pub outputs: BTreeMap<&'static str, String>,
    /// Contents of a plot
    pub items: Vec<String>,
}

impl StoredObject {
    fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            name: None,
            properties: BTreeMap::new(),
            values: Vec::new(),
            outputs: BTreeMap::new(),
            items: Vec::new(),
        }
    }

    fn with_options(mut self, options: &Options<'_>) -> Self {
        for (name, value) in options.0 {
            self.properties.insert(name.clone(), value.clone());
        }
        self
    }
}

type Compute = Box<dyn FnOnce(&mut StoredObject) -> Vec<(&'static str, Vec<f64>)> + Send>;

/// A new object whose samples still have to be computed
pub(crate) struct Derivation {
    object: StoredObject,
    compute: Compute,
}

impl Derivation {
    /// Run the computation; reads nothing from the store
    pub fn run(self) -> Derived {
        let Derivation { mut object, compute } = self;
        let outputs = compute(&mut object);
        Derived { object, outputs }
    }
}

/// Computed object, ready for [`Store::insert_derived`]
pub(crate) struct Derived {
    object: StoredObject,
    outputs: Vec<(&'static str, Vec<f64>)>,
}

pub(crate) enum Prepared {
    Stored(String),
    Derive(Derivation),
}

impl Prepared {
    fn derive(
        object: StoredObject,
        compute: impl FnOnce(&mut StoredObject) -> Vec<(&'static str, Vec<f64>)> + Send + 'static,
    ) -> Self {
        Prepared::Derive(Derivation {
            object,
            compute: Box::new(compute),
        })
    }
}

/// Short id prefix, as the plotting process shows it
fn prefix(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Plot => "P",
        ObjectKind::Curve => "C",
        ObjectKind::Vector => "V",
        ObjectKind::Scalar => "X",
        ObjectKind::Equation => "E",
        ObjectKind::Spectrum => "S",
        ObjectKind::CrossSpectrum => "XS",
        ObjectKind::Histogram => "H",
        ObjectKind::SumFilter => "F",
        ObjectKind::Circle => "Ci",
        ObjectKind::Button => "B",
        ObjectKind::LineEdit => "LE",
    }
}

#[derive(Debug)]
pub(crate) struct Store {
    objects: HashMap<String, StoredObject>,
    counters: HashMap<ObjectKind, u32>,
    tabs: u32,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            counters: HashMap::new(),
            tabs: 1,
        }
    }
}

impl Store {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    fn insert(&mut self, object: StoredObject) -> String {
        let counter = self.counters.entry(object.kind).or_insert(0);
        *counter += 1;
        let id = format!("{}{counter}", prefix(object.kind));
        tracing::debug!(id = %id, kind = %object.kind, "object created");
        self.objects.insert(id.clone(), object);
        id
    }

    /// Look up `id`, which must be of `kind`
    pub fn get(&self, id: &str, kind: ObjectKind) -> Result<&StoredObject, RemoteFault> {
        let object = self.objects.get(id).ok_or_else(|| unknown(id))?;
        if object.kind != kind {
            return Err(wrong_kind(id, object.kind, kind));
        }
        Ok(object)
    }

    fn get_mut(&mut self, id: &str, kind: ObjectKind) -> Result<&mut StoredObject, RemoteFault> {
        let object = self.objects.get_mut(id).ok_or_else(|| unknown(id))?;
        if object.kind != kind {
            return Err(wrong_kind(id, object.kind, kind));
        }
        Ok(object)
    }

    fn vector(&self, id: &str) -> Result<&[f64], RemoteFault> {
        self.get(id, ObjectKind::Vector).map(|v| v.values.as_slice())
    }

    fn scalar(&self, id: &str) -> Result<f64, RemoteFault> {
        let object = self.get(id, ObjectKind::Scalar)?;
        Ok(object
            .properties
            .get("value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0))
    }

    pub fn new_vector(&mut self, values: Vec<f64>) -> String {
        let mut object = StoredObject::new(ObjectKind::Vector);
        object.values = values;
        self.insert(object)
    }

    /// Add a vector read from `source`
    pub fn new_data_vector(
        &mut self,
        source: &str,
        values: Vec<f64>,
        options: &Options<'_>,
    ) -> String {
        let mut object = StoredObject::new(ObjectKind::Vector).with_options(options);
        object
            .properties
            .insert("file".to_string(), Value::from(source));
        object.values = values;
        self.insert(object)
    }

    fn with_outputs(
        &mut self,
        mut object: StoredObject,
        outputs: Vec<(&'static str, Vec<f64>)>,
    ) -> String {
        for (name, values) in outputs {
            let id = self.new_vector(values);
            object.outputs.insert(name, id);
        }
        self.insert(object)
    }

    /// `<kind>.create`, computing derived samples in place
    #[cfg(test)]
    pub fn create(&mut self, kind: ObjectKind, args: &[Value], options: &Options<'_>) -> Outcome {
        let id = match self.prepare(kind, args, options)? {
            Prepared::Stored(id) => id,
            Prepared::Derive(derivation) => self.insert_derived(derivation.run()),
        };
        Ok(Value::Str(id))
    }

    /// Store a finished derivation and its output vectors
    pub fn insert_derived(&mut self, derived: Derived) -> String {
        self.with_outputs(derived.object, derived.outputs)
    }

    /// Validate a `<kind>.create` and copy out what its computation reads
    ///
    /// Objects without derived samples are stored right away.
    pub fn prepare(
        &mut self,
        kind: ObjectKind,
        args: &[Value],
        options: &Options<'_>,
    ) -> Result<Prepared, RemoteFault> {
        let command = format!("{kind}.create");
        let command = command.as_str();

        let id = match kind {
            ObjectKind::Plot => self.insert(StoredObject::new(kind).with_options(options)),
            ObjectKind::Vector => match args {
                [] => self.new_vector(Vec::new()),
                [samples] => {
                    let values = float_samples(command, samples)?;
                    self.new_vector(values)
                }
                [_, _, count] => {
                    let from = arg_f64(command, args, 0)?;
                    let to = arg_f64(command, args, 1)?;
                    let count = count
                        .as_i64()
                        .and_then(|n| usize::try_from(n).ok())
                        .filter(|&n| n <= analysis::MAX_GENERATED_SAMPLES)
                        .ok_or_else(|| {
                            invalid(format!(
                                "{command}: count must be between 0 and {}",
                                analysis::MAX_GENERATED_SAMPLES
                            ))
                        })?;
                    return Ok(Prepared::derive(StoredObject::new(kind), move |object| {
                        object.values = analysis::linspace(from, to, count);
                        Vec::new()
                    }));
                }
                _ => {
                    return Err(invalid(format!(
                        "{command}: expected samples, a source file or (from, to, count)"
                    )));
                }
            },
            ObjectKind::Scalar => {
                let value = arg_f64(command, args, 0)?;
                let mut object = StoredObject::new(kind);
                object.properties.insert("value".to_string(), Value::Float(value));
                self.insert(object)
            }
            ObjectKind::Equation => {
                let x_id = arg_str(command, args, 0)?;
                let text = arg_str(command, args, 1)?;
                let expression = Expression::parse(text)
                    .map_err(|e| invalid(format!("invalid equation '{text}': {e}")))?;
                let x = self.vector(x_id)?.to_vec();

                let mut object = StoredObject::new(kind);
                object
                    .properties
                    .insert("equation".to_string(), Value::from(text));
                return Ok(Prepared::derive(object, move |_| {
                    let y = x.iter().map(|&v| expression.eval(v)).collect();
                    vec![("x", x), ("y", y)]
                }));
            }
            ObjectKind::Curve => {
                let x = arg_str(command, args, 0)?;
                let y = arg_str(command, args, 1)?;
                self.vector(x)?;
                self.vector(y)?;
                let mut object = StoredObject::new(kind);
                object.properties.insert("x".to_string(), Value::from(x));
                object.properties.insert("y".to_string(), Value::from(y));
                self.insert(object)
            }
            ObjectKind::Spectrum => {
                let input = self.vector(arg_str(command, args, 0)?)?.to_vec();
                let log2_len = u32::try_from(options.int("fft_length", 10)?)
                    .map_err(|_| invalid("option 'fft_length' out of range"))?;
                let rate = options.f64("sample_rate", 1.0)?;
                let remove_mean = options.bool("remove_mean", true)?;
                let object = StoredObject::new(kind).with_options(options);
                return Ok(Prepared::derive(object, move |_| {
                    let spectrum = analysis::periodogram(&input, None, log2_len, rate, remove_mean);
                    vec![("x", spectrum.frequencies), ("y", spectrum.power)]
                }));
            }
            ObjectKind::CrossSpectrum => {
                let first = self.vector(arg_str(command, args, 0)?)?.to_vec();
                let second = self.vector(arg_str(command, args, 1)?)?.to_vec();
                let log2_len = self.scalar(arg_str(command, args, 2)?)?;
                let log2_len = log2_len.clamp(1.0, f64::from(analysis::MAX_FFT_LOG2)) as u32;
                let rate = self.scalar(arg_str(command, args, 3)?)?;
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(invalid(format!("{command}: sample rate must be positive")));
                }
                return Ok(Prepared::derive(StoredObject::new(kind), move |_| {
                    let second = Some(second.as_slice());
                    let spectrum = analysis::periodogram(&first, second, log2_len, rate, true);
                    vec![("x", spectrum.frequencies), ("y", spectrum.power)]
                }));
            }
            ObjectKind::Histogram => {
                let input = self.vector(arg_str(command, args, 0)?)?.to_vec();
                let bins = usize::try_from(options.int("num_bins", 60)?)
                    .ok()
                    .filter(|&n| n <= analysis::MAX_HISTOGRAM_BINS)
                    .ok_or_else(|| invalid("option 'num_bins' out of range"))?;
                let normalization = u32::try_from(options.int("normalization", 0)?).unwrap_or(0);
                let min = options.f64("bin_min", 0.0)?;
                let max = options.f64("bin_max", 1.0)?;
                let auto_bin = options.bool("auto_bin", true)?;
                let object = StoredObject::new(kind).with_options(options);
                return Ok(Prepared::derive(object, move |_| {
                    let histogram =
                        analysis::histogram(&input, min, max, bins, normalization, auto_bin);
                    vec![("x", histogram.centres), ("y", histogram.heights)]
                }));
            }
            ObjectKind::SumFilter => {
                let input = self.vector(arg_str(command, args, 0)?)?.to_vec();
                let step = self.scalar(arg_str(command, args, 1)?)?;
                return Ok(Prepared::derive(StoredObject::new(kind), move |_| {
                    vec![("sum", analysis::cumulative_sum(&input, step))]
                }));
            }
            ObjectKind::Circle => {
                let center = arg(command, args, 0)?;
                let center = float_samples(command, center)?;
                if center.len() != 2 {
                    return Err(invalid(format!("{command}: centre needs two coordinates")));
                }
                let radius = arg_f64(command, args, 1)?;
                let color = arg_str(command, args, 2)?;
                let mut object = StoredObject::new(kind);
                object
                    .properties
                    .insert("position".to_string(), Value::from(center));
                object
                    .properties
                    .insert("radius".to_string(), Value::Float(radius));
                object
                    .properties
                    .insert("color".to_string(), Value::from(color));
                self.insert(object)
            }
            ObjectKind::Button | ObjectKind::LineEdit => {
                let text = arg_str(command, args, 0)?;
                let mut object = StoredObject::new(kind).with_options(options);
                object
                    .properties
                    .insert("text".to_string(), Value::from(text));
                self.insert(object)
            }
        };
        Ok(Prepared::Stored(id))
    }

    /// `<kind>.delete`; derived outputs go with their owner
    pub fn delete(&mut self, kind: ObjectKind, id: &str) -> Outcome {
        self.get(id, kind)?;
        if let Some(object) = self.objects.remove(id) {
            for output in object.outputs.values() {
                self.objects.remove(output);
            }
        }
        for object in self.objects.values_mut() {
            object.items.retain(|item| item != id);
        }
        tracing::debug!(id, "object deleted");
        Ok(Value::Nil)
    }

    pub fn name(&self, kind: ObjectKind, id: &str) -> Outcome {
        let object = self.get(id, kind)?;
        Ok(Value::from(object.name.as_deref().unwrap_or(id)))
    }

    pub fn property(&self, kind: ObjectKind, id: &str, property: &str) -> Outcome {
        let object = self.get(id, kind)?;
        if property == "name" {
            return self.name(kind, id);
        }
        object
            .properties
            .get(property)
            .cloned()
            .ok_or_else(|| invalid(format!("'{id}' has no property '{property}'")))
    }

    /// `<kind>.set_<property>`
    pub fn set_property(
        &mut self,
        kind: ObjectKind,
        id: &str,
        property: &str,
        value: Value,
    ) -> Outcome {
        let object = self.get_mut(id, kind)?;
        if property == "name" {
            let name = value
                .into_string()
                .ok_or_else(|| invalid("name must be a string"))?;
            object.name = Some(name);
        } else {
            object.properties.insert(property.to_string(), value);
        }
        Ok(Value::Nil)
    }

    pub fn add_to_plot(&mut self, plot: &str, item: &str) -> Outcome {
        if !self.objects.contains_key(item) {
            return Err(unknown(item));
        }
        let plot = self.get_mut(plot, ObjectKind::Plot)?;
        if !plot.items.iter().any(|existing| existing == item) {
            plot.items.push(item.to_string());
        }
        Ok(Value::Nil)
    }

    pub fn values(&self, id: &str) -> Outcome {
        self.vector(id).map(|v| Value::Floats(v.to_vec()))
    }

    pub fn load(&mut self, id: &str, values: Vec<f64>) -> Outcome {
        self.get_mut(id, ObjectKind::Vector)?.values = values;
        Ok(Value::Nil)
    }

    pub fn length(&self, id: &str) -> Outcome {
        self.vector(id).map(|v| Value::Int(v.len() as i64))
    }

    /// Id of the derived vector `output` of `id`
    pub fn output(&self, kind: ObjectKind, id: &str, output: &str) -> Outcome {
        let object = self.get(id, kind)?;
        object
            .outputs
            .get(output)
            .map(|vector| Value::from(vector.as_str()))
            .ok_or_else(|| invalid(format!("'{id}' has no output '{output}'")))
    }

    /// Check that `id` names a widget
    pub fn widget(&self, id: &str) -> Result<ObjectKind, RemoteFault> {
        let object = self.objects.get(id).ok_or_else(|| unknown(id))?;
        if !object.kind.is_widget() {
            return Err(invalid(format!("'{id}' is a {}, not a widget", object.kind)));
        }
        Ok(object.kind)
    }

    pub fn new_tab(&mut self) -> Outcome {
        self.tabs += 1;
        Ok(Value::Int(i64::from(self.tabs)))
    }
}

fn unknown(id: &str) -> RemoteFault {
    RemoteFault::new(RemoteFault::UNKNOWN_OBJECT, format!("no object named '{id}'"))
}

fn wrong_kind(id: &str, found: ObjectKind, expected: ObjectKind) -> RemoteFault {
    invalid(format!("'{id}' is a {found}, not a {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_OPTIONS: Options<'static> = Options(&[]);

    fn create(store: &mut Store, kind: ObjectKind, args: Vec<Value>) -> String {
        store
            .create(kind, &args, &NO_OPTIONS)
            .unwrap()
            .into_string()
            .unwrap()
    }

    #[test]
    fn test_ids_follow_kind_prefixes() {
        let mut store = Store::default();
        assert_eq!(create(&mut store, ObjectKind::Plot, vec![]), "P1");
        assert_eq!(create(&mut store, ObjectKind::Plot, vec![]), "P2");
        assert_eq!(create(&mut store, ObjectKind::Vector, vec![]), "V1");
        assert_eq!(
            create(&mut store, ObjectKind::Scalar, vec![Value::Float(2.0)]),
            "X1"
        );
    }

    #[test]
    fn test_generated_vector() {
        let mut store = Store::default();
        let id = create(
            &mut store,
            ObjectKind::Vector,
            vec![Value::Float(-1.0), Value::Float(1.0), Value::Int(100)],
        );
        let values = store.values(&id).unwrap().into_floats().unwrap();
        assert_eq!(values.len(), 100);
        assert_eq!(values[0], -1.0);
        assert_eq!(values[99], 1.0);
    }

    #[test]
    fn test_generated_vector_count_is_bounded() {
        let mut store = Store::default();
        let too_many = analysis::MAX_GENERATED_SAMPLES as i64 + 1;
        for count in [too_many, -1] {
            let fault = store
                .create(
                    ObjectKind::Vector,
                    &[Value::Float(0.0), Value::Float(1.0), Value::Int(count)],
                    &NO_OPTIONS,
                )
                .unwrap_err();
            assert_eq!(fault.code, RemoteFault::INVALID_ARGUMENT);
        }
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_derivation_runs_outside_the_store() {
        let mut store = Store::default();
        let x = create(&mut store, ObjectKind::Vector, vec![Value::from(vec![1.0, 2.0])]);
        let prepared = store
            .prepare(
                ObjectKind::Equation,
                &[Value::from(x.as_str()), Value::from("2*x")],
                &NO_OPTIONS,
            )
            .unwrap();
        let Prepared::Derive(derivation) = prepared else {
            panic!("equations are derived");
        };
        // Deleting the input first leaves the computation unaffected
        store.delete(ObjectKind::Vector, &x).unwrap();
        let eq = store.insert_derived(derivation.run());

        let y = store.output(ObjectKind::Equation, &eq, "y").unwrap();
        let y = store.values(y.as_str().unwrap()).unwrap();
        assert_eq!(y, Value::Floats(vec![2.0, 4.0]));
    }

    #[test]
    fn test_equation_outputs() {
        let mut store = Store::default();
        let x = create(&mut store, ObjectKind::Vector, vec![Value::from(vec![1.0, 2.0, 3.0])]);
        let eq = create(
            &mut store,
            ObjectKind::Equation,
            vec![Value::from(x.as_str()), Value::from("x^2")],
        );
        let y = store.output(ObjectKind::Equation, &eq, "y").unwrap();
        let y = store.values(y.as_str().unwrap()).unwrap();
        assert_eq!(y, Value::Floats(vec![1.0, 4.0, 9.0]));
    }

    #[test]
    fn test_malformed_equation_is_invalid_argument() {
        let mut store = Store::default();
        let x = create(&mut store, ObjectKind::Vector, vec![]);
        for text in ["", "(x"] {
            let fault = store
                .create(
                    ObjectKind::Equation,
                    &[Value::from(x.as_str()), Value::from(text)],
                    &NO_OPTIONS,
                )
                .unwrap_err();
            assert_eq!(fault.code, RemoteFault::INVALID_ARGUMENT);
        }
    }

    #[test]
    fn test_unknown_and_mismatched_ids() {
        let mut store = Store::default();
        let plot = create(&mut store, ObjectKind::Plot, vec![]);
        assert_eq!(store.values("V9").unwrap_err().code, RemoteFault::UNKNOWN_OBJECT);
        assert_eq!(store.values(&plot).unwrap_err().code, RemoteFault::INVALID_ARGUMENT);
        assert_eq!(
            store.add_to_plot(&plot, "C7").unwrap_err().code,
            RemoteFault::UNKNOWN_OBJECT
        );
    }

    #[test]
    fn test_delete_removes_outputs_and_plot_items() {
        let mut store = Store::default();
        let v = create(&mut store, ObjectKind::Vector, vec![Value::from(vec![1.0, 2.0])]);
        let step = create(&mut store, ObjectKind::Scalar, vec![Value::Float(1.0)]);
        let filter = create(
            &mut store,
            ObjectKind::SumFilter,
            vec![Value::from(v.as_str()), Value::from(step.as_str())],
        );
        let plot = create(&mut store, ObjectKind::Plot, vec![]);
        store.add_to_plot(&plot, &filter).unwrap();
        assert_eq!(store.len(), 5);

        store.delete(ObjectKind::SumFilter, &filter).unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.get(&plot, ObjectKind::Plot).unwrap().items.is_empty());
    }

    #[test]
    fn test_properties() {
        let mut store = Store::default();
        let curve_x = create(&mut store, ObjectKind::Vector, vec![]);
        let curve = create(
            &mut store,
            ObjectKind::Curve,
            vec![Value::from(curve_x.as_str()), Value::from(curve_x.as_str())],
        );
        store
            .set_property(ObjectKind::Curve, &curve, "color", Value::from("blue"))
            .unwrap();
        assert_eq!(
            store.property(ObjectKind::Curve, &curve, "color").unwrap(),
            Value::from("blue")
        );
        assert!(store.property(ObjectKind::Curve, &curve, "shape").is_err());

        assert_eq!(store.name(ObjectKind::Curve, &curve).unwrap(), Value::from("C1"));
        store
            .set_property(ObjectKind::Curve, &curve, "name", Value::from("sine"))
            .unwrap();
        assert_eq!(store.name(ObjectKind::Curve, &curve).unwrap(), Value::from("sine"));
    }
}
