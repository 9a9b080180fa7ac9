//! Text DSL for integer pipelines.
//!
//! Pipeline format (CMS Pipelines style):
//! ```text
//! PIPE CONSOLE
//! | FILTER EVEN
//! | MAP ADD 1
//! | DROP 2
//! | FLATMAP 1 10 100
//! | CONSOLE
//! ?
//! ```
//!
//! - `PIPE <stage>` starts the pipeline
//! - `| <stage>` continues to the next stage
//! - `?` on its own line marks the end of the pipeline
//! - Lines starting with `#` are comments
//!
//! Stage position rules:
//! - First stage must be a source: CONSOLE, LITERAL, or HOLE
//! - CONSOLE anywhere else passes elements through
//! - LITERAL is only valid as the first stage
//!
//! Supported stages:
//! - `CONSOLE` - Read integers from input (first) or pass through
//! - `LITERAL n1 n2 ...` - Indexed source of literal integers
//! - `HOLE` - Empty source (first) or discard everything (elsewhere)
//! - `FILTER EVEN|ODD|LT n|LE n|GT n|GE n|EQ n|NE n` - Keep matching elements
//! - `MAP ADD n|SUB n|MUL n|NEG` - Transform every element
//! - `FLATMAP n1 n2 ...` - Replace x by x*n1, x*n2, ...
//! - `DUPLICATE n` - Repeat each element n times
//! - `DROP n` / `SKIP n` - Skip the first n elements
//! - `TAKE n` - Keep the first n elements
//! - `TAKEWHILE <test>` - Keep elements until the first one failing the test
//! - `APPEND n1 n2 ...` - Append literal integers after the stream so far

use crate::compiler::CompileOptions;
use crate::error::{Result, XformError};
use crate::explain::PlanSummary;
use crate::Xform;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Element test used by FILTER and TAKEWHILE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Test {
    Even,
    Odd,
    Lt(i64),
    Le(i64),
    Gt(i64),
    Ge(i64),
    Eq(i64),
    Ne(i64),
}

impl Test {
    pub fn matches(self, x: i64) -> bool {
        match self {
            Test::Even => x % 2 == 0,
            Test::Odd => x % 2 != 0,
            Test::Lt(n) => x < n,
            Test::Le(n) => x <= n,
            Test::Gt(n) => x > n,
            Test::Ge(n) => x >= n,
            Test::Eq(n) => x == n,
            Test::Ne(n) => x != n,
        }
    }
}

/// Arithmetic used by MAP. Overflow wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add(i64),
    Sub(i64),
    Mul(i64),
    Neg,
}

impl Arith {
    pub fn apply(self, x: i64) -> i64 {
        match self {
            Arith::Add(n) => x.wrapping_add(n),
            Arith::Sub(n) => x.wrapping_sub(n),
            Arith::Mul(n) => x.wrapping_mul(n),
            Arith::Neg => x.wrapping_neg(),
        }
    }
}

/// Parsed pipeline command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CONSOLE - read input (first) or pass through
    Console,
    /// LITERAL n1 n2 ...
    Literal { values: Vec<i64> },
    /// HOLE - empty source, or discard everything
    Hole,
    /// FILTER <test>
    Filter { test: Test },
    /// MAP <arith>
    Map { op: Arith },
    /// FLATMAP n1 n2 ...
    FlatMap { factors: Vec<i64> },
    /// DUPLICATE n
    Duplicate { n: usize },
    /// DROP n (or SKIP n). Signed so negative amounts reach the builder.
    Drop { n: i64 },
    /// TAKE n
    Take { n: i64 },
    /// TAKEWHILE <test>
    TakeWhile { test: Test },
    /// APPEND n1 n2 ...
    Append { values: Vec<i64> },
}

impl Command {
    /// Can this stage be the first stage in a pipeline (source)?
    pub fn can_be_first(&self) -> bool {
        matches!(
            self,
            Command::Console | Command::Literal { .. } | Command::Hole
        )
    }

    /// Get the stage name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Console => "CONSOLE",
            Command::Literal { .. } => "LITERAL",
            Command::Hole => "HOLE",
            Command::Filter { .. } => "FILTER",
            Command::Map { .. } => "MAP",
            Command::FlatMap { .. } => "FLATMAP",
            Command::Duplicate { .. } => "DUPLICATE",
            Command::Drop { .. } => "DROP",
            Command::Take { .. } => "TAKE",
            Command::TakeWhile { .. } => "TAKEWHILE",
            Command::Append { .. } => "APPEND",
        }
    }
}

/// Parse DSL text into commands.
pub fn parse_commands(text: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = if line.len() > 5
            && line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("PIPE "))
        {
            line[5..].trim()
        } else if line.eq_ignore_ascii_case("PIPE") {
            continue;
        } else {
            line
        };

        let line = match line.strip_prefix('|') {
            Some(stripped) => stripped.trim(),
            None => line,
        };

        let line = line.trim_end_matches('|').trim();
        let line = line.trim_end_matches('?').trim();

        if line.is_empty() {
            continue;
        }

        let cmd = parse_command(line).map_err(|message| XformError::Parse {
            line: line_num + 1,
            message,
        })?;
        commands.push(cmd);
    }

    Ok(commands)
}

/// Parse a single command line.
fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut words = line.split_whitespace();
    let keyword = words.next().unwrap_or_default().to_uppercase();
    let args: Vec<&str> = words.collect();

    match keyword.as_str() {
        "CONSOLE" => Ok(Command::Console),
        "HOLE" => Ok(Command::Hole),
        "LITERAL" => Ok(Command::Literal {
            values: parse_numbers("LITERAL", &args)?,
        }),
        "FILTER" => Ok(Command::Filter {
            test: parse_test("FILTER", &args)?,
        }),
        "TAKEWHILE" => Ok(Command::TakeWhile {
            test: parse_test("TAKEWHILE", &args)?,
        }),
        "MAP" => Ok(Command::Map {
            op: parse_arith(&args)?,
        }),
        "FLATMAP" => {
            let factors = parse_numbers("FLATMAP", &args)?;
            if factors.is_empty() {
                return Err("FLATMAP requires at least one factor".to_string());
            }
            Ok(Command::FlatMap { factors })
        }
        "DUPLICATE" => {
            let n: usize = single_arg("DUPLICATE", &args)?
                .parse()
                .map_err(|_| "DUPLICATE requires a number")?;
            if n == 0 {
                return Err("DUPLICATE count must be at least 1".to_string());
            }
            Ok(Command::Duplicate { n })
        }
        "DROP" | "SKIP" => Ok(Command::Drop {
            n: parse_amount(&keyword, &args)?,
        }),
        "TAKE" => Ok(Command::Take {
            n: parse_amount("TAKE", &args)?,
        }),
        "APPEND" => {
            let values = parse_numbers("APPEND", &args)?;
            if values.is_empty() {
                return Err("APPEND requires at least one number".to_string());
            }
            Ok(Command::Append { values })
        }
        _ => Err(format!(
            "Unknown command: {}",
            line.split_whitespace().next().unwrap_or(line)
        )),
    }
}

fn single_arg<'a>(name: &str, args: &[&'a str]) -> std::result::Result<&'a str, String> {
    match args {
        [arg] => Ok(arg),
        _ => Err(format!("{name} requires a number")),
    }
}

fn parse_amount(name: &str, args: &[&str]) -> std::result::Result<i64, String> {
    single_arg(name, args)?
        .parse()
        .map_err(|_| format!("{name} requires a number"))
}

fn parse_numbers(name: &str, args: &[&str]) -> std::result::Result<Vec<i64>, String> {
    args.iter()
        .map(|a| {
            a.parse::<i64>()
                .map_err(|_| format!("{name}: invalid number '{a}'"))
        })
        .collect()
}

/// Parse `EVEN`, `ODD`, or `<op> n`.
fn parse_test(name: &str, args: &[&str]) -> std::result::Result<Test, String> {
    let (op, value) = match args {
        [op] => (op.to_uppercase(), None),
        [op, value] => {
            let value: i64 = value
                .parse()
                .map_err(|_| format!("{name}: invalid number '{value}'"))?;
            (op.to_uppercase(), Some(value))
        }
        _ => return Err(format!("{name} requires a test like EVEN or LT 5")),
    };

    match (op.as_str(), value) {
        ("EVEN", None) => Ok(Test::Even),
        ("ODD", None) => Ok(Test::Odd),
        ("LT", Some(n)) => Ok(Test::Lt(n)),
        ("LE", Some(n)) => Ok(Test::Le(n)),
        ("GT", Some(n)) => Ok(Test::Gt(n)),
        ("GE", Some(n)) => Ok(Test::Ge(n)),
        ("EQ", Some(n)) => Ok(Test::Eq(n)),
        ("NE", Some(n)) => Ok(Test::Ne(n)),
        _ => Err(format!("{name}: unknown test '{}'", args.join(" "))),
    }
}

/// Parse `ADD n`, `SUB n`, `MUL n`, or `NEG`.
fn parse_arith(args: &[&str]) -> std::result::Result<Arith, String> {
    match args {
        [op] if op.eq_ignore_ascii_case("NEG") => Ok(Arith::Neg),
        [op, value] => {
            let n: i64 = value
                .parse()
                .map_err(|_| format!("MAP: invalid number '{value}'"))?;
            match op.to_uppercase().as_str() {
                "ADD" => Ok(Arith::Add(n)),
                "SUB" => Ok(Arith::Sub(n)),
                "MUL" => Ok(Arith::Mul(n)),
                other => Err(format!("MAP: unknown operation '{other}'")),
            }
        }
        _ => Err("MAP requires ADD n, SUB n, MUL n, or NEG".to_string()),
    }
}

/// Parse whitespace-separated integers from input text.
pub fn parse_input(input_text: &str) -> Result<Vec<i64>> {
    let mut values = Vec::new();
    for (line_num, line) in input_text.lines().enumerate() {
        for word in line.split_whitespace() {
            let value = word.parse().map_err(|_| XformError::Parse {
                line: line_num + 1,
                message: format!("Invalid input integer '{word}'"),
            })?;
            values.push(value);
        }
    }
    Ok(values)
}

/// A pipeline description built from DSL text, with its source size.
pub struct BuiltPipeline {
    pub xform: Xform<i64>,
    pub input_count: usize,
}

/// Build a description from parsed commands and input values.
pub fn build_pipeline(commands: &[Command], input: Vec<i64>) -> Result<BuiltPipeline> {
    let Some(first) = commands.first() else {
        return Err(XformError::InvalidPipeline("Pipeline is empty".to_string()));
    };

    if !first.can_be_first() {
        return Err(XformError::InvalidPipeline(format!(
            "{} cannot be the first stage (try CONSOLE, LITERAL, or HOLE)",
            first.name()
        )));
    }

    let (mut xform, input_count) = match first {
        Command::Console => {
            let count = input.len();
            (Xform::from_sequential(input), count)
        }
        Command::Literal { values } => (Xform::from_indexed(values.clone()), values.len()),
        Command::Hole => (Xform::from_indexed(Vec::new()), 0),
        _ => {
            return Err(XformError::InvalidPipeline(format!(
                "Unhandled source stage: {}",
                first.name()
            )));
        }
    };

    for cmd in &commands[1..] {
        xform = apply_command(xform, cmd)?;
    }

    Ok(BuiltPipeline { xform, input_count })
}

/// Extend a description with one command.
fn apply_command(xform: Xform<i64>, cmd: &Command) -> Result<Xform<i64>> {
    match cmd {
        // CONSOLE in the middle of a pipeline just passes through
        Command::Console => Ok(xform),
        Command::Literal { .. } => Err(XformError::InvalidPipeline(
            "LITERAL can only be the first stage (use APPEND to add elements)".to_string(),
        )),
        Command::Hole => Ok(xform.take(0)),
        Command::Filter { test } => {
            let test = *test;
            Ok(xform.filter(move |x| test.matches(*x)))
        }
        Command::Map { op } => {
            let op = *op;
            Ok(xform.map(move |x| op.apply(x)))
        }
        Command::FlatMap { factors } => {
            let factors = factors.clone();
            Ok(xform.flat_map(move |x| {
                factors
                    .iter()
                    .map(|f| x.wrapping_mul(*f))
                    .collect::<Vec<_>>()
            }))
        }
        Command::Duplicate { n } => {
            let n = *n;
            Ok(xform.flat_map(move |x| std::iter::repeat_n(x, n)))
        }
        Command::Drop { n } => xform.try_drop(*n),
        Command::Take { n } => xform.try_take(*n),
        Command::TakeWhile { test } => {
            let test = *test;
            Ok(xform.take_while(move |x| test.matches(*x)))
        }
        Command::Append { values } => Ok(xform.concat(values.clone())),
    }
}

/// Execute a pipeline defined by DSL text on input integers.
///
/// Returns (output_text, input_count, output_count) on success.
pub fn execute_pipeline(input_text: &str, pipeline_text: &str) -> Result<(String, usize, usize)> {
    execute_pipeline_with(CompileOptions::default(), input_text, pipeline_text)
}

/// Execute a pipeline with explicit compiler options.
pub fn execute_pipeline_with(
    options: CompileOptions,
    input_text: &str,
    pipeline_text: &str,
) -> Result<(String, usize, usize)> {
    let built = prepare(input_text, pipeline_text)?;

    let output = built.xform.fold_with(options, Vec::new(), |mut acc, x| {
        acc.push(x);
        acc
    });
    let output_count = output.len();
    debug!(input = built.input_count, output = output_count, "pipeline executed");

    let output_text = output
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join("\n");

    Ok((output_text, built.input_count, output_count))
}

/// Compile a pipeline without running it and summarize the plan.
pub fn explain_pipeline(
    options: CompileOptions,
    input_text: &str,
    pipeline_text: &str,
) -> Result<PlanSummary> {
    let built = prepare(input_text, pipeline_text)?;
    Ok(built.xform.compile_with(options).summary())
}

/// Read a pipeline file and an input file, then execute.
pub fn execute_files(
    options: CompileOptions,
    pipeline_path: impl AsRef<Path>,
    input_path: impl AsRef<Path>,
) -> Result<(String, usize, usize)> {
    let pipeline_text = fs::read_to_string(pipeline_path)?;
    let input_text = fs::read_to_string(input_path)?;
    execute_pipeline_with(options, &input_text, &pipeline_text)
}

fn prepare(input_text: &str, pipeline_text: &str) -> Result<BuiltPipeline> {
    let commands = parse_commands(pipeline_text)?;
    // Only a CONSOLE source reads the input.
    let input = match commands.first() {
        Some(Command::Console) => parse_input(input_text)?,
        _ => Vec::new(),
    };
    build_pipeline(&commands, input)
}
