use std::path::Path;
use std::process::{Command, Output};
use std::time::Instant;

use log::{debug, info};

use super::{Contribution, Toolchain};
use crate::errors::{InputError, PipelineError, PipelineResult};
use crate::field::Curve;

/// Drives the real `circom` and `snarkjs` executables.
#[derive(Clone, Debug)]
pub struct CommandToolchain {
    circom: String,
    snarkjs: String,
}

impl CommandToolchain {
    pub fn new(circom: impl Into<String>, snarkjs: impl Into<String>) -> Self {
        Self {
            circom: circom.into(),
            snarkjs: snarkjs.into(),
        }
    }

    fn snarkjs(&self, args: &[&str]) -> PipelineResult<Output> {
        run(&self.snarkjs, args, 2)
    }

    fn snarkjs_unchecked(&self, args: &[&str]) -> PipelineResult<Output> {
        spawn(&self.snarkjs, args)
    }
}

impl Default for CommandToolchain {
    fn default() -> Self {
        Self::new("circom", "snarkjs")
    }
}

impl Toolchain for CommandToolchain {
    fn compile(&self, source: &Path, out_dir: &Path) -> PipelineResult<()> {
        let source = path_arg(source);
        let out_dir = path_arg(out_dir);
        run(
            &self.circom,
            &[&source, "--r1cs", "--wasm", "--sym", "-o", &out_dir],
            0,
        )?;
        Ok(())
    }

    fn powers_of_tau_new(&self, curve: Curve, power: u32, out: &Path) -> PipelineResult<()> {
        let power = power.to_string();
        self.snarkjs(&["powersoftau", "new", curve.tool_name(), &power, &path_arg(out), "-v"])?;
        Ok(())
    }

    fn powers_of_tau_contribute(
        &self,
        input: &Path,
        out: &Path,
        contribution: &Contribution,
    ) -> PipelineResult<()> {
        let name = format!("--name={}", contribution.name);
        let entropy = format!("-e={}", contribution.entropy);
        self.snarkjs(&[
            "powersoftau",
            "contribute",
            &path_arg(input),
            &path_arg(out),
            &name,
            "-v",
            &entropy,
        ])?;
        Ok(())
    }

    fn prepare_phase2(&self, input: &Path, out: &Path) -> PipelineResult<()> {
        self.snarkjs(&["powersoftau", "prepare", "phase2", &path_arg(input), &path_arg(out), "-v"])?;
        Ok(())
    }

    fn groth16_setup(&self, r1cs: &Path, ptau: &Path, zkey_out: &Path) -> PipelineResult<()> {
        self.snarkjs(&["groth16", "setup", &path_arg(r1cs), &path_arg(ptau), &path_arg(zkey_out)])?;
        Ok(())
    }

    fn zkey_contribute(
        &self,
        input: &Path,
        out: &Path,
        contribution: &Contribution,
    ) -> PipelineResult<()> {
        let name = format!("--name={}", contribution.name);
        let entropy = format!("-e={}", contribution.entropy);
        self.snarkjs(&[
            "zkey",
            "contribute",
            &path_arg(input),
            &path_arg(out),
            &name,
            "-v",
            &entropy,
        ])?;
        Ok(())
    }

    fn export_verification_key(&self, zkey: &Path, out: &Path) -> PipelineResult<()> {
        self.snarkjs(&["zkey", "export", "verificationkey", &path_arg(zkey), &path_arg(out)])?;
        Ok(())
    }

    fn calculate_witness(&self, wasm: &Path, input_json: &Path, out: &Path) -> PipelineResult<()> {
        let args: [&str; 5] = [
            "wtns",
            "calculate",
            &path_arg(wasm),
            &path_arg(input_json),
            &path_arg(out),
        ];
        let output = self.snarkjs_unchecked(&args)?;
        if output.status.success() {
            return Ok(());
        }
        let diagnostic = combined_output(&output);
        if let Some(violation) = constraint_violation(&diagnostic) {
            return Err(InputError::ConstraintViolated(violation).into());
        }
        Err(tool_failure(&self.snarkjs, &args, &output, 2))
    }

    fn check_witness(&self, r1cs: &Path, wtns: &Path) -> PipelineResult<()> {
        let args: [&str; 4] = ["wtns", "check", &path_arg(r1cs), &path_arg(wtns)];
        let output = self.snarkjs_unchecked(&args)?;
        let diagnostic = combined_output(&output);
        if let Some(violation) = constraint_violation(&diagnostic) {
            return Err(InputError::ConstraintViolated(violation).into());
        }
        if output.status.success() {
            Ok(())
        } else {
            Err(tool_failure(&self.snarkjs, &args, &output, 2))
        }
    }

    fn prove(
        &self,
        zkey: &Path,
        wtns: &Path,
        proof_out: &Path,
        public_out: &Path,
    ) -> PipelineResult<()> {
        self.snarkjs(&[
            "groth16",
            "prove",
            &path_arg(zkey),
            &path_arg(wtns),
            &path_arg(proof_out),
            &path_arg(public_out),
        ])?;
        Ok(())
    }

    fn verify(&self, vkey: &Path, public: &Path, proof: &Path) -> PipelineResult<bool> {
        let args: [&str; 5] = ["groth16", "verify", &path_arg(vkey), &path_arg(public), &path_arg(proof)];
        let output = self.snarkjs_unchecked(&args)?;
        let text = combined_output(&output);
        if output.status.success() && text.contains("OK") {
            return Ok(true);
        }
        if text.contains("Invalid proof") {
            return Ok(false);
        }
        Err(tool_failure(&self.snarkjs, &args, &output, 2))
    }

    fn export_calldata(&self, public: &Path, proof: &Path) -> PipelineResult<String> {
        let output = self.snarkjs(&[
            "zkey",
            "export",
            "soliditycalldata",
            &path_arg(public),
            &path_arg(proof),
        ])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn export_verifier(&self, zkey: &Path, out: &Path) -> PipelineResult<()> {
        self.snarkjs(&["zkey", "export", "solidityverifier", &path_arg(zkey), &path_arg(out)])?;
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Runs the program and turns a non-zero exit into `ExternalTool`.
///
/// `label_args` is how many leading arguments name the subcommand in errors.
fn run(program: &str, args: &[&str], label_args: usize) -> PipelineResult<Output> {
    let output = spawn(program, args)?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(tool_failure(program, args, &output, label_args))
    }
}

fn spawn(program: &str, args: &[&str]) -> PipelineResult<Output> {
    info!("Running {} {}", program, redact(args).join(" "));
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| PipelineError::ToolSpawn {
            tool: program.to_string(),
            source,
        })?;
    debug!(
        "{} finished with {} in {:?}",
        program,
        output.status,
        start.elapsed()
    );
    Ok(output)
}

fn tool_failure(program: &str, args: &[&str], output: &Output, label_args: usize) -> PipelineError {
    let mut tool = program.to_string();
    for arg in args.iter().take(label_args) {
        tool.push(' ');
        tool.push_str(arg);
    }
    PipelineError::ExternalTool {
        tool,
        status: output.status.code(),
        diagnostic: combined_output(output),
    }
}

fn combined_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut text = stderr.trim().to_string();
    if !stdout.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stdout.trim());
    }
    text
}

/// Entropy must never reach the logs.
fn redact<'a>(args: &[&'a str]) -> Vec<&'a str> {
    args.iter()
        .map(|a| if a.starts_with("-e=") { "-e=<redacted>" } else { *a })
        .collect()
}

/// Extracts the evaluator's report of a failed assertion or unmatched constraint.
fn constraint_violation(diagnostic: &str) -> Option<String> {
    const MARKERS: [&str; 4] = [
        "Assert Failed",
        "Error in template",
        "Constraint doesn't match",
        "WITNESS IS NOT CORRECT",
    ];
    let lines: Vec<&str> = diagnostic
        .lines()
        .filter(|l| MARKERS.iter().any(|m| l.contains(m)))
        .map(str::trim)
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_is_redacted() {
        let args = ["zkey", "contribute", "a", "b", "--name=x", "-v", "-e=secret"];
        let shown = redact(&args).join(" ");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("--name=x"));
    }

    #[test]
    fn violations_are_pulled_out_of_tool_output() {
        let out = "[ERROR] snarkJS: Error: Error: Assert Failed.\nError in template Multiplier2_0 line: 9\n    at foo";
        let found = constraint_violation(out).unwrap();
        assert!(found.contains("Assert Failed"));
        assert!(found.contains("line: 9"));
        assert!(constraint_violation("ENOENT: no such file").is_none());
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let tc = CommandToolchain::new("circom", "zkpipe-definitely-not-installed");
        let err = tc
            .verify(Path::new("vk.json"), Path::new("public.json"), Path::new("proof.json"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ToolSpawn { .. }));
        assert_eq!(err.exit_code(), 4);
    }
}
