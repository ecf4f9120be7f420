//! Command-line surface: the `step` verb's flag set and the `put`/`filter`
//! DSL verbs, declared with `clap`'s derive API.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mlr", bin_name = "mlr")]
#[command(about = "Streaming tabular-record transformer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply stateful per-field, per-group stepper accumulators
    #[command(after_help = r#"EXAMPLES:
  mlr step -a delta -f x
  mlr step -a rsum,counter -f v -g g
  mlr step -a decay -f x -d 0.5,0.9 -F"#)]
    Step {
        /// Comma-separated stepper names (delta, from-first, ratio, rsum, counter, decay)
        #[arg(short = 'a', long = "steppers", value_name = "LIST", value_delimiter = ',')]
        steppers: Vec<String>,

        /// Comma-separated value field names to step over
        #[arg(short = 'f', long = "fields", value_name = "LIST", value_delimiter = ',')]
        fields: Vec<String>,

        /// Comma-separated group-by field names
        #[arg(short = 'g', long = "group-by", value_name = "LIST", value_delimiter = ',')]
        group_by: Vec<String>,

        /// Comma-separated decay alpha values (used by the `decay` stepper)
        #[arg(short = 'd', long = "alphas", value_name = "LIST", value_delimiter = ',', default_value = "0.5")]
        alphas: Vec<String>,

        /// Force floating-point output for integer-capable steppers
        #[arg(short = 'F', long = "float")]
        float: bool,
    },

    /// Run a put program over the record stream, updating `$*`/oosvars
    Put {
        /// DSL program text
        #[arg(value_name = "PROGRAM")]
        program: String,

        /// Type-inferencing policy for `$field` reads
        #[arg(long, value_enum, default_value_t = InferArg::StringsFloatsAndInts)]
        infer: InferArg,

        /// Colorize `dump` output with ANSI escape codes
        #[arg(long)]
        color: bool,
    },

    /// Run a filter program; the final bare boolean decides record pass-through
    Filter {
        /// DSL program text; must end in a bare boolean expression
        #[arg(value_name = "PROGRAM")]
        program: String,

        /// Type-inferencing policy for `$field` reads
        #[arg(long, value_enum, default_value_t = InferArg::StringsFloatsAndInts)]
        infer: InferArg,

        /// Invert the final filter boolean
        #[arg(short = 'x', long = "invert")]
        invert: bool,

        /// Colorize `dump` output with ANSI escape codes
        #[arg(long)]
        color: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum InferArg {
    StringsOnly,
    StringsAndFloats,
    StringsFloatsAndInts,
}

impl From<InferArg> for mlr_core::InferencePolicy {
    fn from(a: InferArg) -> Self {
        match a {
            InferArg::StringsOnly => mlr_core::InferencePolicy::StringsOnly,
            InferArg::StringsAndFloats => mlr_core::InferencePolicy::StringsAndFloats,
            InferArg::StringsFloatsAndInts => mlr_core::InferencePolicy::StringsFloatsAndInts,
        }
    }
}
