//! The stepper abstraction and the six required steppers.
//!
//! A stepper reads one value field per record and writes one or more
//! derived fields into that same record. Dispatch on the field's shape
//! (numeric double, numeric under the int/float policy, raw string, or
//! empty) is expressed as a small set of default-no-op trait methods —
//! a stepper overrides only the callbacks it needs, and the transformer
//! invokes all four unconditionally.

use mlr_core::{Record, Value};

use crate::error::StepError;

/// A stateful accumulator keyed by `(group, value field, stepper name)`.
pub trait Stepper {
    /// The field is present, non-empty, and parses as a float.
    fn process_double(&mut self, _input: f64, _rec: &mut Record, _ofmt: Option<&str>) {}
    /// The field is present, non-empty, and parses as a [`Value`] under the
    /// configured int/float policy.
    fn process_numeric(&mut self, _input: &Value, _rec: &mut Record, _ofmt: Option<&str>) {}
    /// The field is present and non-empty, as a raw string.
    fn process_string(&mut self, _input: &str, _rec: &mut Record) {}
    /// The field is present with an empty value.
    fn process_absent(&mut self, _rec: &mut Record) {}
}

/// Build a stepper by name, as named on the `-a` flag.
pub fn make_stepper(
    step_name: &str,
    input_field_name: &str,
    allow_int_float: bool,
    string_alphas: &[String],
) -> Result<Box<dyn Stepper>, StepError> {
    Ok(match step_name {
        "delta" => Box::new(Delta::new(input_field_name, allow_int_float)),
        "from-first" => Box::new(FromFirst::new(input_field_name, allow_int_float)),
        "ratio" => Box::new(Ratio::new(input_field_name)),
        "rsum" => Box::new(Rsum::new(input_field_name, allow_int_float)),
        "counter" => Box::new(Counter::new(input_field_name, allow_int_float)),
        "decay" => Box::new(Decay::new(input_field_name, string_alphas)?),
        other => return Err(StepError::UnknownStepper(other.to_string())),
    })
}

fn zero(allow_int_float: bool) -> Value {
    if allow_int_float {
        Value::Int(0)
    } else {
        Value::Float(0.0)
    }
}

/// `delta`: current minus previous; zero on the first record.
struct Delta {
    prev: Option<Value>,
    output_field_name: String,
    allow_int_float: bool,
}

impl Delta {
    fn new(input_field_name: &str, allow_int_float: bool) -> Self {
        Self {
            prev: None,
            output_field_name: format!("{input_field_name}_delta"),
            allow_int_float,
        }
    }
}

impl Stepper for Delta {
    fn process_numeric(&mut self, input: &Value, rec: &mut Record, ofmt: Option<&str>) {
        let delta = match &self.prev {
            None => zero(self.allow_int_float),
            Some(prev) => input.sub(prev),
        };
        rec.put(&self.output_field_name, delta.format_value(ofmt));
        self.prev = Some(input.clone());
    }

    fn process_absent(&mut self, rec: &mut Record) {
        rec.put(&self.output_field_name, "");
    }
}

/// `from-first`: current minus the first value ever seen; zero on the
/// first record.
struct FromFirst {
    first: Option<Value>,
    output_field_name: String,
    allow_int_float: bool,
}

impl FromFirst {
    fn new(input_field_name: &str, allow_int_float: bool) -> Self {
        Self {
            first: None,
            output_field_name: format!("{input_field_name}_from_first"),
            allow_int_float,
        }
    }
}

impl Stepper for FromFirst {
    fn process_numeric(&mut self, input: &Value, rec: &mut Record, ofmt: Option<&str>) {
        let out = match &self.first {
            None => {
                self.first = Some(input.clone());
                zero(self.allow_int_float)
            }
            Some(first) => input.sub(first),
        };
        rec.put(&self.output_field_name, out.format_value(ofmt));
    }

    fn process_absent(&mut self, rec: &mut Record) {
        rec.put(&self.output_field_name, "");
    }
}

/// `ratio`: current divided by previous, always float; `1.0` on the first
/// record.
struct Ratio {
    prev: Option<f64>,
    output_field_name: String,
}

impl Ratio {
    fn new(input_field_name: &str) -> Self {
        Self { prev: None, output_field_name: format!("{input_field_name}_ratio") }
    }
}

impl Stepper for Ratio {
    fn process_double(&mut self, input: f64, rec: &mut Record, ofmt: Option<&str>) {
        let ratio = match self.prev {
            None => 1.0,
            Some(prev) => input / prev,
        };
        rec.put(&self.output_field_name, Value::Float(ratio).format_value(ofmt));
        self.prev = Some(input);
    }

    fn process_absent(&mut self, rec: &mut Record) {
        rec.put(&self.output_field_name, "");
    }
}

/// `rsum`: running sum, initialized to zero of the configured numeric
/// kind.
struct Rsum {
    rsum: Value,
    output_field_name: String,
}

impl Rsum {
    fn new(input_field_name: &str, allow_int_float: bool) -> Self {
        Self { rsum: zero(allow_int_float), output_field_name: format!("{input_field_name}_rsum") }
    }
}

impl Stepper for Rsum {
    fn process_numeric(&mut self, input: &Value, rec: &mut Record, ofmt: Option<&str>) {
        self.rsum = self.rsum.add(input);
        rec.put(&self.output_field_name, self.rsum.format_value(ofmt));
    }

    fn process_absent(&mut self, rec: &mut Record) {
        rec.put(&self.output_field_name, "");
    }
}

/// `counter`: running count of records where the field is present,
/// including empty. Driven off presence of the raw string, not its
/// content, so it fires even on non-numeric values.
struct Counter {
    counter: Value,
    one: Value,
    output_field_name: String,
}

impl Counter {
    fn new(input_field_name: &str, allow_int_float: bool) -> Self {
        Self {
            counter: zero(allow_int_float),
            one: if allow_int_float { Value::Int(1) } else { Value::Float(1.0) },
            output_field_name: format!("{input_field_name}_counter"),
        }
    }
}

impl Stepper for Counter {
    fn process_string(&mut self, _input: &str, rec: &mut Record) {
        self.counter = self.counter.add(&self.one);
        rec.put(&self.output_field_name, self.counter.format_value(None));
    }

    fn process_absent(&mut self, rec: &mut Record) {
        self.counter = self.counter.add(&self.one);
        rec.put(&self.output_field_name, self.counter.format_value(None));
    }
}

/// `decay`: one exponentially-weighted moving average per α; the raw
/// value is carried in on the first record.
struct Decay {
    alphas: Vec<f64>,
    alphacompls: Vec<f64>,
    prevs: Vec<f64>,
    have_prevs: bool,
    output_field_names: Vec<String>,
}

impl Decay {
    fn new(input_field_name: &str, string_alphas: &[String]) -> Result<Self, StepError> {
        let mut alphas = Vec::with_capacity(string_alphas.len());
        let mut alphacompls = Vec::with_capacity(string_alphas.len());
        let mut output_field_names = Vec::with_capacity(string_alphas.len());
        for s in string_alphas {
            let a: f64 = s.parse().map_err(|_| StepError::BadAlpha(s.clone()))?;
            alphas.push(a);
            alphacompls.push(1.0 - a);
            output_field_names.push(format!("{input_field_name}_decay_{s}"));
        }
        let prevs = vec![0.0; alphas.len()];
        Ok(Self { alphas, alphacompls, prevs, have_prevs: false, output_field_names })
    }
}

impl Stepper for Decay {
    fn process_double(&mut self, input: f64, rec: &mut Record, ofmt: Option<&str>) {
        if !self.have_prevs {
            for i in 0..self.alphas.len() {
                rec.put(&self.output_field_names[i], Value::Float(input).format_value(ofmt));
                self.prevs[i] = input;
            }
            self.have_prevs = true;
        } else {
            for i in 0..self.alphas.len() {
                let curr = self.alphas[i] * input + self.alphacompls[i] * self.prevs[i];
                rec.put(&self.output_field_names[i], Value::Float(curr).format_value(ofmt));
                self.prevs[i] = curr;
            }
        }
    }

    fn process_absent(&mut self, rec: &mut Record) {
        for name in &self.output_field_names {
            rec.put(name, "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(field: &str, v: &str) -> Record {
        let mut r = Record::new();
        r.put(field, v);
        r
    }

    #[test]
    fn delta_first_record_is_zero() {
        let mut s = Delta::new("x", true);
        let mut r = rec("x", "1");
        s.process_numeric(&Value::Int(1), &mut r, None);
        assert_eq!(r.get("x_delta"), Some("0"));
        let mut r2 = rec("x", "4");
        s.process_numeric(&Value::Int(4), &mut r2, None);
        assert_eq!(r2.get("x_delta"), Some("3"));
    }

    #[test]
    fn ratio_first_record_is_one() {
        let mut s = Ratio::new("x");
        let mut r = rec("x", "5");
        s.process_double(5.0, &mut r, None);
        assert_eq!(r.get("x_ratio"), Some("1"));
        let mut r2 = rec("x", "10");
        s.process_double(10.0, &mut r2, None);
        assert_eq!(r2.get("x_ratio"), Some("2"));
    }

    #[test]
    fn counter_increments_regardless_of_value() {
        let mut s = Counter::new("x", true);
        let mut r = rec("x", "z");
        s.process_string("z", &mut r);
        assert_eq!(r.get("x_counter"), Some("1"));
        s.process_string("z", &mut r);
        assert_eq!(r.get("x_counter"), Some("2"));
    }

    #[test]
    fn decay_matches_spec_example() {
        let mut s = Decay::new("x", &["0.5".to_string()]).unwrap();
        let mut r1 = rec("x", "1");
        s.process_double(1.0, &mut r1, None);
        assert_eq!(r1.get("x_decay_0.5"), Some("1"));
        let mut r2 = rec("x", "2");
        s.process_double(2.0, &mut r2, None);
        assert_eq!(r2.get("x_decay_0.5"), Some("1.5"));
        let mut r3 = rec("x", "3");
        s.process_double(3.0, &mut r3, None);
        assert_eq!(r3.get("x_decay_0.5"), Some("2.25"));
    }

    #[test]
    fn rsum_passthrough_integer_kind() {
        let mut s = Rsum::new("v", true);
        let mut r = rec("v", "10");
        s.process_numeric(&Value::Int(10), &mut r, None);
        assert_eq!(r.get("v_rsum"), Some("10"));
        let mut r2 = rec("v", "20");
        s.process_numeric(&Value::Int(20), &mut r2, None);
        assert_eq!(r2.get("v_rsum"), Some("30"));
    }
}
