fn main() {
    if let Err(e) = run() {
        eprintln!("parley-score failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use parley_core::{align, score, AlignThresholds};
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    #[derive(Debug)]
    struct Args {
        fixtures: PathBuf,
        threshold: u8,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Deserialize)]
    struct Case {
        candidate: String,
        expected: String,
    }

    #[derive(Debug, Clone, Serialize)]
    struct CaseResult {
        line: usize,
        candidate: String,
        expected: String,
        score: Option<u8>,
        accepted: bool,
        summary: String,
        diff: String,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        fixtures: String,
        threshold: u8,
        total_cases: usize,
        scored_cases: usize,
        empty_cases: usize,
        avg_score: Option<f64>,
        p50_score: Option<f64>,
        acceptance_rate: f64,
        cases: Vec<CaseResult>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut fixtures: Option<PathBuf> = None;
        let mut threshold: u8 = 70;
        let mut output: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--fixtures" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --fixtures".into());
                    };
                    fixtures = Some(PathBuf::from(v));
                }
                "--threshold" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --threshold".into());
                    };
                    threshold = v
                        .parse::<u8>()
                        .map_err(|_| "invalid value for --threshold".to_string())?
                        .min(100);
                }
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p parley-core --bin parley-score -- \\
  --fixtures <cases.jsonl> [--threshold <0-100>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }

        let Some(fixtures) = fixtures else {
            return Err("--fixtures is required".into());
        };
        Ok(Args {
            fixtures,
            threshold,
            output,
        })
    }

    fn median(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(sorted[(sorted.len() - 1) / 2])
    }

    let args = parse_args()?;
    let raw = std::fs::read_to_string(&args.fixtures)
        .map_err(|e| format!("{}: {e}", args.fixtures.display()))?;
    let thresholds = AlignThresholds::default();

    let mut cases = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let case: Case =
            serde_json::from_str(line).map_err(|e| format!("line {line_no}: {e}"))?;
        let s = score(&case.candidate, &case.expected);
        let alignment = align(&case.candidate, &case.expected, &thresholds);
        cases.push(CaseResult {
            line: line_no,
            accepted: s.is_some_and(|v| v >= args.threshold),
            score: s,
            summary: alignment.summary(),
            diff: alignment.render(),
            candidate: case.candidate,
            expected: case.expected,
        });
    }

    let scores: Vec<f64> = cases.iter().filter_map(|c| c.score.map(f64::from)).collect();
    let accepted = cases.iter().filter(|c| c.accepted).count();
    let summary = Summary {
        fixtures: args.fixtures.display().to_string(),
        threshold: args.threshold,
        total_cases: cases.len(),
        scored_cases: scores.len(),
        empty_cases: cases.len() - scores.len(),
        avg_score: if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        },
        p50_score: median(&scores),
        acceptance_rate: if cases.is_empty() {
            0.0
        } else {
            accepted as f64 / cases.len() as f64
        },
        cases,
    };

    eprintln!(
        "Done. cases={} accepted={:.1}% avg={}",
        summary.total_cases,
        summary.acceptance_rate * 100.0,
        summary
            .avg_score
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "n/a".into())
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote score report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
