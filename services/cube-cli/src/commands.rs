//! Command implementations.
//!
//! Every command writes its result to the given writer and reports whether
//! it found problems through [`Outcome`]. Runtime failures are returned as
//! errors.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use cube_store::{
    assert_cube, flag_statistics, resolve_flag_bands, verify_cube, CubeStore, DatasetDescriptor,
};
use flag_coding::{FlagBandDescriptor, FlagCoding, FlagCodingRegistry, FlagError};

use crate::config::{CliConfig, OutputFormat};

/// Result of a command that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to report.
    Clean,
    /// Validation or verification found issues.
    Findings,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Clean => ExitCode::SUCCESS,
            Outcome::Findings => ExitCode::from(1),
        }
    }

    fn from_issues(issues: &[String]) -> Self {
        if issues.is_empty() {
            Outcome::Clean
        } else {
            Outcome::Findings
        }
    }
}

/// Shared state of one CLI invocation.
pub struct Runner<W: Write> {
    pub registry: FlagCodingRegistry,
    pub format: OutputFormat,
    pub out: W,
}

impl<W: Write> Runner<W> {
    /// Build the registry from the built-in codings plus the configured file.
    pub fn new(config: &CliConfig, out: W) -> Result<Self> {
        let mut registry =
            FlagCodingRegistry::builtin().context("Built-in flag-coding registry is invalid")?;
        if let Some(path) = &config.registry_path {
            let extra = FlagCodingRegistry::load(path)
                .with_context(|| format!("Failed to load registry {:?}", path))?;
            registry.extend(extra);
        }
        debug!(codings = ?registry.names().collect::<Vec<_>>(), "Flag-coding registry ready");

        Ok(Self {
            registry,
            format: config.output.format,
            out,
        })
    }

    fn write_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, value)?;
        writeln!(self.out)?;
        Ok(())
    }

    /// Print the flags set in each value.
    pub fn decode(&mut self, descriptor: &Path, values: &[String]) -> Result<Outcome> {
        let coding = load_coding(descriptor)?;
        let values = values
            .iter()
            .map(|v| parse_value(v))
            .collect::<Result<Vec<_>>>()?;

        match self.format {
            OutputFormat::Text => {
                for &value in &values {
                    let set = coding.decode(value);
                    if set.is_empty() {
                        writeln!(self.out, "{value}: (none)")?;
                    } else {
                        writeln!(self.out, "{value}: {set}")?;
                    }
                }
            }
            OutputFormat::Json => {
                let decoded: Vec<_> = coding
                    .decode_many(&values)
                    .iter()
                    .map(|set| json!({ "value": set.value(), "flags": set.names() }))
                    .collect();
                self.write_json(&decoded)?;
            }
        }
        Ok(Outcome::Clean)
    }

    /// Print the value that sets exactly the named flags.
    pub fn encode(&mut self, descriptor: &Path, names: &[String]) -> Result<Outcome> {
        let coding = load_coding(descriptor)?;
        let value = coding.encode(names)?;
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{value}")?,
            OutputFormat::Json => self.write_json(&json!({ "value": value, "flags": names }))?,
        }
        Ok(Outcome::Clean)
    }

    /// Print the flag table of a descriptor.
    pub fn flags(&mut self, descriptor: &Path) -> Result<Outcome> {
        let coding = load_coding(descriptor)?;
        match self.format {
            OutputFormat::Text => {
                writeln!(self.out, "{} ({})", coding.name(), coding.long_name())?;
                let width = coding
                    .flags()
                    .iter()
                    .map(|f| f.meaning.len())
                    .max()
                    .unwrap_or(0);
                for flag in coding.flags() {
                    writeln!(
                        self.out,
                        "{:>3}  {:>11}  bit {:>2}  {:<width$}  {}",
                        flag.index,
                        flag.mask.value(),
                        flag.mask.bit(),
                        flag.meaning,
                        flag.description
                    )?;
                }
            }
            OutputFormat::Json => self.write_json(&coding)?,
        }
        Ok(Outcome::Clean)
    }

    /// Validate a descriptor file and compare it with the registry.
    pub fn validate(&mut self, descriptor: &Path) -> Result<Outcome> {
        let issues = match FlagBandDescriptor::from_path(descriptor) {
            Ok(parsed) => {
                let mut issues = Vec::new();
                if let Err(e) = parsed.validate() {
                    issues.push(e.to_string());
                } else {
                    issues.extend(self.registry.check(&parsed));
                }
                issues
            }
            Err(e @ FlagError::Io(_)) => return Err(e.into()),
            Err(e) => vec![e.to_string()],
        };
        info!(path = %descriptor.display(), issues = issues.len(), "Validated descriptor");

        match self.format {
            OutputFormat::Text => {
                if issues.is_empty() {
                    writeln!(self.out, "{}: valid", descriptor.display())?;
                } else {
                    writeln!(self.out, "{}: invalid", descriptor.display())?;
                    for issue in &issues {
                        writeln!(self.out, "- {issue}")?;
                    }
                }
            }
            OutputFormat::Json => self.write_json(&json!({
                "path": descriptor.display().to_string(),
                "valid": issues.is_empty(),
                "issues": issues,
            }))?,
        }
        Ok(Outcome::from_issues(&issues))
    }

    /// Print the dataset descriptor of a cube as JSON.
    pub fn describe(&mut self, cube: &Path) -> Result<Outcome> {
        let dataset = open_dataset(cube)?;
        self.write_json(&dataset)?;
        Ok(Outcome::Clean)
    }

    /// Print a text summary of a cube.
    pub fn dump(&mut self, cube: &Path) -> Result<Outcome> {
        let dataset = open_dataset(cube)?;
        match self.format {
            OutputFormat::Text => write!(self.out, "{}", dataset.dump())?,
            OutputFormat::Json => self.write_json(&dataset)?,
        }
        Ok(Outcome::Clean)
    }

    /// Check a cube against the cube conventions.
    pub fn verify(&mut self, cube: &Path) -> Result<Outcome> {
        let dataset = open_dataset(cube)?;
        let issues = verify_cube(&dataset);
        info!(dataset = %dataset.id, issues = issues.len(), "Verified cube");

        match self.format {
            OutputFormat::Text => match assert_cube(&dataset, None) {
                Ok(()) => writeln!(self.out, "Dataset '{}' is a valid data cube.", dataset.id)?,
                Err(e) => writeln!(self.out, "{e}")?,
            },
            OutputFormat::Json => self.write_json(&json!({
                "dataset": dataset.id,
                "valid": issues.is_empty(),
                "issues": issues,
            }))?,
        }
        Ok(Outcome::from_issues(&issues))
    }

    /// Resolve every flag band of a cube and compare it with the registry.
    pub fn bands(&mut self, cube: &Path) -> Result<Outcome> {
        let store = open_store(cube)?;
        let mut reports = Vec::new();
        let mut findings = false;

        for (name, result) in resolve_flag_bands(&store) {
            let report = match result {
                Ok(band) => {
                    let issues = self.registry.check(&band.descriptor);
                    findings |= !issues.is_empty();
                    json!({
                        "name": name,
                        "dtype": band.dtype,
                        "shape": band.shape,
                        "dimensions": band.descriptor.dimensions,
                        "coding": band.coding.name(),
                        "flags": band.coding.len(),
                        "issues": issues,
                    })
                }
                Err(e) => {
                    findings = true;
                    json!({ "name": name, "error": e.to_string() })
                }
            };
            reports.push(report);
        }

        match self.format {
            OutputFormat::Text => {
                if reports.is_empty() {
                    writeln!(self.out, "no flag bands")?;
                }
                for report in &reports {
                    self.write_band_line(report)?;
                }
            }
            OutputFormat::Json => self.write_json(&reports)?,
        }

        Ok(if findings {
            Outcome::Findings
        } else {
            Outcome::Clean
        })
    }

    fn write_band_line(&mut self, report: &serde_json::Value) -> Result<()> {
        let name = report["name"].as_str().unwrap_or_default();
        if let Some(error) = report["error"].as_str() {
            writeln!(self.out, "{name}: {error}")?;
            return Ok(());
        }
        writeln!(
            self.out,
            "{name}: {} {} coding '{}' with {} flags",
            report["dtype"].as_str().unwrap_or_default(),
            report["shape"],
            report["coding"].as_str().unwrap_or_default(),
            report["flags"]
        )?;
        for issue in report["issues"].as_array().into_iter().flatten() {
            writeln!(self.out, "- {}", issue.as_str().unwrap_or_default())?;
        }
        Ok(())
    }

    /// Print per-flag pixel counts of one flag band.
    pub fn stats(&mut self, cube: &Path, variable: &str) -> Result<Outcome> {
        let store = open_store(cube)?;
        let stats = flag_statistics(&store, variable)
            .with_context(|| format!("Failed to compute statistics of '{variable}'"))?;

        match self.format {
            OutputFormat::Text => {
                writeln!(
                    self.out,
                    "{} ({}): {} pixels, {} unflagged",
                    stats.variable, stats.coding, stats.total, stats.unflagged
                )?;
                let width = stats
                    .counts
                    .iter()
                    .map(|c| c.meaning.len())
                    .max()
                    .unwrap_or(0);
                for count in &stats.counts {
                    let percent = stats.fraction(&count.meaning).unwrap_or(0.0) * 100.0;
                    writeln!(
                        self.out,
                        "{:<width$}  {:>12}  {:>7.3}%",
                        count.meaning, count.count, percent
                    )?;
                }
            }
            OutputFormat::Json => self.write_json(&stats)?,
        }
        Ok(Outcome::Clean)
    }
}

/// Parse a pixel value given in decimal or as `0x`-prefixed hex.
///
/// Hex values are read as unsigned 64-bit patterns, so `0x80000000` sets the
/// 32-bit sign-bit flag just like `-2147483648` does.
pub fn parse_value(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"));
    match hex {
        Some(digits) => u64::from_str_radix(&digits.replace('_', ""), 16)
            .map(|v| v as i64)
            .with_context(|| format!("Invalid hex value '{text}'")),
        None => trimmed
            .parse::<i64>()
            .with_context(|| format!("Invalid value '{text}'")),
    }
}

fn load_coding(path: &Path) -> Result<FlagCoding> {
    let descriptor = FlagBandDescriptor::from_path(path)?;
    let coding = descriptor
        .coding()
        .with_context(|| format!("Invalid flag descriptor {:?}", path))?;
    Ok(coding)
}

fn open_store(path: &Path) -> Result<CubeStore> {
    CubeStore::open(path).with_context(|| format!("Failed to open cube {:?}", path))
}

fn open_dataset(path: &Path) -> Result<DatasetDescriptor> {
    let store = open_store(path)?;
    DatasetDescriptor::from_store(&store)
        .with_context(|| format!("Failed to describe cube {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{example_flag_descriptor_path, CubeFixture};

    fn runner(format: OutputFormat) -> Runner<Vec<u8>> {
        let config = CliConfig {
            output: crate::config::OutputConfig { format },
            ..Default::default()
        };
        Runner::new(&config, Vec::new()).unwrap()
    }

    fn output(ctx: Runner<Vec<u8>>) -> String {
        String::from_utf8(ctx.out).unwrap()
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("0").unwrap(), 0);
        assert_eq!(parse_value("3").unwrap(), 3);
        assert_eq!(parse_value("-2147483648").unwrap(), -2147483648);
        assert_eq!(parse_value("0x10").unwrap(), 16);
        assert_eq!(parse_value("0X8000_0000").unwrap(), 0x8000_0000);
        assert!(parse_value("three").is_err());
        assert!(parse_value("0xZZ").is_err());
    }

    #[test]
    fn test_decode_text() {
        let mut ctx = runner(OutputFormat::Text);
        let outcome = ctx
            .decode(
                &example_flag_descriptor_path(),
                &args(&["0", "1", "3", "-2147483648"]),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Clean);
        assert_eq!(
            output(ctx),
            "0: (none)\n1: Rtosa_OOS\n3: Rtosa_OOS Rtosa_OOR\n-2147483648: Valid_PE\n"
        );
    }

    #[test]
    fn test_decode_json_hex() {
        let mut ctx = runner(OutputFormat::Json);
        ctx.decode(&example_flag_descriptor_path(), &args(&["0x80000000"]))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output(ctx)).unwrap();
        assert_eq!(value[0]["flags"], json!(["Valid_PE"]));
    }

    #[test]
    fn test_encode() {
        let mut ctx = runner(OutputFormat::Text);
        ctx.encode(
            &example_flag_descriptor_path(),
            &args(&["Rtosa_OOR", "Rtosa_OOS"]),
        )
        .unwrap();
        assert_eq!(output(ctx), "3\n");

        let mut ctx = runner(OutputFormat::Text);
        assert!(ctx
            .encode(&example_flag_descriptor_path(), &args(&["Bogus"]))
            .is_err());
    }

    #[test]
    fn test_flags_table() {
        let mut ctx = runner(OutputFormat::Text);
        ctx.flags(&example_flag_descriptor_path()).unwrap();
        let text = output(ctx);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 22);
        assert!(lines[1].contains("Rtosa_OOS"));
        assert!(lines[21].contains("-2147483648"));
        assert!(lines[21].contains("bit 31"));
    }

    #[test]
    fn test_validate_example_descriptor() {
        let mut ctx = runner(OutputFormat::Text);
        let outcome = ctx.validate(&example_flag_descriptor_path()).unwrap();
        assert_eq!(outcome, Outcome::Clean);
        assert!(output(ctx).ends_with(": valid\n"));
    }

    #[test]
    fn test_validate_reports_malformed_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".zattrs");
        std::fs::write(
            &path,
            r#"{"flag_coding_name": "c2rcc_flags", "long_name": "x",
                "flag_masks": [1, 2], "flag_meanings": "A", "flag_descriptions": "a\tb"}"#,
        )
        .unwrap();

        let mut ctx = runner(OutputFormat::Json);
        let outcome = ctx.validate(&path).unwrap();
        assert_eq!(outcome, Outcome::Findings);
        let value: serde_json::Value = serde_json::from_str(&output(ctx)).unwrap();
        assert_eq!(value["valid"], json!(false));
        assert_eq!(value["issues"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_validate_missing_file_is_error() {
        let mut ctx = runner(OutputFormat::Text);
        assert!(ctx.validate(Path::new("/nonexistent/.zattrs")).is_err());
    }

    #[test]
    fn test_verify_and_bands_on_fixture() {
        let (_dir, path) = CubeFixture::standard(2, 3, 4).write_temp();

        let mut ctx = runner(OutputFormat::Text);
        assert_eq!(ctx.verify(&path).unwrap(), Outcome::Clean);
        assert_eq!(output(ctx), "Dataset 'cube.zarr' is a valid data cube.\n");

        let mut ctx = runner(OutputFormat::Text);
        assert_eq!(ctx.bands(&path).unwrap(), Outcome::Clean);
        assert_eq!(
            output(ctx),
            "c2rcc_flags: int32 [2,3,4] coding 'c2rcc_flags' with 21 flags\n"
        );
    }

    #[test]
    fn test_verify_reports_findings() {
        let (_dir, path) = CubeFixture::standard(2, 3, 4).without("lon").write_temp();
        let mut ctx = runner(OutputFormat::Json);
        assert_eq!(ctx.verify(&path).unwrap(), Outcome::Findings);
        let value: serde_json::Value = serde_json::from_str(&output(ctx)).unwrap();
        assert_eq!(value["valid"], json!(false));
    }

    #[test]
    fn test_verify_reports_coordinate_values() {
        let (_dir, path) = CubeFixture::standard(2, 3, 4)
            .with_array("lon", |a| a.values(&[179.5, 180.0, 180.5, 181.0]))
            .write_temp();
        let mut ctx = runner(OutputFormat::Json);
        assert_eq!(ctx.verify(&path).unwrap(), Outcome::Findings);
        let value: serde_json::Value = serde_json::from_str(&output(ctx)).unwrap();
        assert_eq!(
            value["issues"],
            json!(["values of coordinate variable 'lon' must be in the range -180.0 to 180.0"])
        );
    }

    #[test]
    fn test_stats_on_unwritten_band() {
        let (_dir, path) = CubeFixture::standard(1, 2, 2).write_temp();
        let mut ctx = runner(OutputFormat::Json);
        ctx.stats(&path, "c2rcc_flags").unwrap();
        let value: serde_json::Value = serde_json::from_str(&output(ctx)).unwrap();
        assert_eq!(value["total"], json!(4));
        assert_eq!(value["unflagged"], json!(4));
    }
}
