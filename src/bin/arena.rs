//! Run an evaluation request against agents reachable over TCP.
//!
//! Usage: `arena <request.json> [output_dir]`
//!
//! Evaluator behavior is read from the `EVAL_*` environment variables (see
//! [`Configuration::from_env`]).

use std::env;
use std::fs;

use anyhow::{bail, Context};
use social_arena::prelude::*;

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let Some(request_path) = args.next() else {
        bail!("usage: arena <request.json> [output_dir]");
    };
    let output_dir = args.next();

    let text = fs::read_to_string(&request_path)
        .with_context(|| format!("could not read request file {request_path}"))?;
    let request = EvalRequest::from_json(&text)?;

    let evaluator = Evaluator::new(TcpMessenger::new(), Configuration::from_env())?;
    let evaluation = evaluator.evaluate(&request)?;

    if let Some(dir) = output_dir {
        evaluation
            .write_artifacts(&dir)
            .with_context(|| format!("could not write results to {dir}"))?;
    }

    for summary in &evaluation.summaries {
        let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_owned(), |v| format!("{v:.3}"));
        println!(
            "{}: games {} | score {:.3} | prediction {} | transparency {}",
            summary.agent,
            summary.games,
            summary.mean_score,
            fmt(summary.mean_prediction_acc),
            fmt(summary.mean_transparency)
        );
    }
    Ok(())
}
