//! The grouped step transformer, driving the step verb's CLI surface.

use indexmap::IndexMap;
use mlr_core::{InferencePolicy, Record, Value};

use crate::error::StepError;
use crate::stepper::{make_stepper, Stepper};

/// Configuration equivalent to the step verb's CLI flags (`-a -f -g -d -F`).
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub stepper_names: Vec<String>,
    pub value_field_names: Vec<String>,
    pub group_by_field_names: Vec<String>,
    pub allow_int_float: bool,
    pub string_alphas: Vec<String>,
    pub ofmt: Option<String>,
}

impl StepConfig {
    fn inference_policy(&self) -> InferencePolicy {
        if self.allow_int_float {
            InferencePolicy::StringsFloatsAndInts
        } else {
            InferencePolicy::StringsAndFloats
        }
    }
}

type StepperTable = IndexMap<String, Box<dyn Stepper>>;
type FieldTable = IndexMap<String, StepperTable>;

/// Maintains the three-level mapping `groupByTuple -> valueFieldName ->
/// stepperName -> StepperState` and drives records through it.
pub struct StepTransformer {
    config: StepConfig,
    groups: IndexMap<Vec<String>, FieldTable>,
}

impl StepTransformer {
    /// Validates every configured stepper name up front, so a bad `-a`
    /// argument fails before any record flows.
    pub fn new(config: StepConfig) -> Result<Self, StepError> {
        for name in &config.stepper_names {
            make_stepper(name, "_probe", config.allow_int_float, &config.string_alphas)?;
        }
        Ok(Self { config, groups: IndexMap::new() })
    }

    /// Process one record, mutating it in place and returning it. Records
    /// whose configured group-by fields aren't all present pass through
    /// unchanged.
    pub fn process_record(&mut self, mut rec: Record) -> Record {
        let Some(key) = self.group_key(&rec) else {
            return rec;
        };
        let policy = self.config.inference_policy();
        let field_table = self.groups.entry(key).or_insert_with(IndexMap::new);

        for field in &self.config.value_field_names {
            let Some(raw) = rec.get(field).map(str::to_string) else {
                continue;
            };
            let steppers = field_table.entry(field.clone()).or_insert_with(IndexMap::new);
            let is_empty = raw.is_empty();
            let numeric = if is_empty { None } else { Some(Value::parse_inferred(&raw, policy)) };
            let double = match &numeric {
                Some(Value::Int(i)) => Some(*i as f64),
                Some(Value::Float(f)) => Some(*f),
                _ => None,
            };

            for name in &self.config.stepper_names {
                let stepper = steppers.entry(name.clone()).or_insert_with(|| {
                    make_stepper(name, field, self.config.allow_int_float, &self.config.string_alphas)
                        .expect("stepper name validated in StepTransformer::new")
                });
                if is_empty {
                    stepper.process_absent(&mut rec);
                    continue;
                }
                if let Some(d) = double {
                    stepper.process_double(d, &mut rec, self.config.ofmt.as_deref());
                }
                if let Some(nv) = &numeric {
                    stepper.process_numeric(nv, &mut rec, self.config.ofmt.as_deref());
                }
                stepper.process_string(&raw, &mut rec);
            }
        }
        rec
    }

    fn group_key(&self, rec: &Record) -> Option<Vec<String>> {
        self.config
            .group_by_field_names
            .iter()
            .map(|name| rec.get(name).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[(&str, &str)]) -> Record {
        let mut r = Record::new();
        for (k, v) in fields {
            r.put(*k, *v);
        }
        r
    }

    fn config(steppers: &[&str], fields: &[&str], group_by: &[&str]) -> StepConfig {
        StepConfig {
            stepper_names: steppers.iter().map(|s| s.to_string()).collect(),
            value_field_names: fields.iter().map(|s| s.to_string()).collect(),
            group_by_field_names: group_by.iter().map(|s| s.to_string()).collect(),
            allow_int_float: true,
            string_alphas: vec!["0.5".to_string()],
            ofmt: None,
        }
    }

    #[test]
    fn unknown_stepper_rejected_eagerly() {
        let cfg = config(&["nope"], &["x"], &[]);
        assert!(StepTransformer::new(cfg).is_err());
    }

    #[test]
    fn delta_no_grouping_matches_spec_example() {
        let cfg = config(&["delta"], &["x"], &[]);
        let mut t = StepTransformer::new(cfg).unwrap();
        let out: Vec<Record> = ["1", "4", "9", "16"]
            .iter()
            .map(|v| t.process_record(rec(&[("x", v)])))
            .collect();
        let deltas: Vec<&str> = out.iter().map(|r| r.get("x_delta").unwrap()).collect();
        assert_eq!(deltas, vec!["0", "3", "5", "7"]);
    }

    #[test]
    fn rsum_counter_grouping_matches_spec_example() {
        let cfg = config(&["rsum", "counter"], &["v"], &["g"]);
        let mut t = StepTransformer::new(cfg).unwrap();
        let input = [("a", "10"), ("b", "1"), ("a", "20"), ("b", "2")];
        let out: Vec<Record> =
            input.iter().map(|(g, v)| t.process_record(rec(&[("g", g), ("v", v)]))).collect();
        let rsums: Vec<&str> = out.iter().map(|r| r.get("v_rsum").unwrap()).collect();
        let counters: Vec<&str> = out.iter().map(|r| r.get("v_counter").unwrap()).collect();
        assert_eq!(rsums, vec!["10", "1", "30", "3"]);
        assert_eq!(counters, vec!["1", "1", "2", "2"]);
    }

    #[test]
    fn missing_group_by_field_passes_through_unchanged() {
        let cfg = config(&["delta"], &["x"], &["g"]);
        let mut t = StepTransformer::new(cfg).unwrap();
        let out = t.process_record(rec(&[("x", "1")]));
        assert!(out.get("x_delta").is_none());
    }

    #[test]
    fn decay_no_grouping_matches_spec_example() {
        let cfg = config(&["decay"], &["x"], &[]);
        let mut t = StepTransformer::new(cfg).unwrap();
        let out: Vec<Record> =
            ["1", "2", "3"].iter().map(|v| t.process_record(rec(&[("x", v)]))).collect();
        let decays: Vec<&str> = out.iter().map(|r| r.get("x_decay_0.5").unwrap()).collect();
        assert_eq!(decays, vec!["1", "1.5", "2.25"]);
    }
}
