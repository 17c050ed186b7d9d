//! Structural Metropolis-Hastings Chain
//!
//! This example runs a single-site MH chain over a mixture model whose number
//! of components is itself random. Moves on the component count add or remove
//! component means, so the chain exercises the new/old density bookkeeping.
//!
//! Set `RUST_LOG=mh_trace=debug` to see per-run and per-proposal logs.

use mh_trace::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DATA: [f64; 8] = [-2.1, -1.8, -2.4, -1.9, 2.2, 1.7, 2.5, 2.0];

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn mixture() -> Vec<f64> {
    let k = sample_structural(&uniform_int_erp(), &[1.0, 3.0])
        .as_i64()
        .unwrap_or(1) as usize;
    let means = repeat(k, |_| gaussian(0.0, 5.0));

    named_scope("likelihood", || {
        let weight = -(k as f64).ln();
        for x in DATA {
            let terms: Vec<f64> = means
                .iter()
                .map(|&m| weight - 0.5 * (x - m).powi(2))
                .collect();
            factor(log_sum_exp(&terms));
        }
    });

    means
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    println!("=== Structural MH over a Mixture ===\n");

    // Driver randomness is separate from the trace's own stream
    let mut rng = StdRng::seed_from_u64(42);
    let mut trace = RandomExecutionTrace::with_config(mixture, TraceConfig::default().with_seed(7))?;

    const STEPS: usize = 5_000;
    const BURN_IN: usize = 1_000;
    let mut accepted = 0;
    let mut k_counts = [0usize; 4];

    for step in 0..STEPS {
        let sites = trace.free_var_names(true, true);
        let site = &sites[rng.gen_range(0..sites.len())];
        let proposal = trace.propose_change(site)?;

        // Site selection is uniform over free choices on both sides
        let selection = (sites.len() as f64).ln()
            - (proposal.trace.free_var_names(true, true).len() as f64).ln();
        let log_alpha = proposal.log_acceptance_ratio(&trace) + selection;

        if proposal.trace.conditions_satisfied() && rng.gen::<f64>().ln() < log_alpha {
            trace = proposal.trace;
            accepted += 1;
        }

        if step >= BURN_IN {
            k_counts[trace.return_value().map_or(0, |m| m.len())] += 1;
        }
    }

    println!("Chain complete!");
    println!("  Steps:      {}", STEPS);
    println!("  Acceptance: {:.3}", accepted as f64 / STEPS as f64);
    println!("\nPosterior over component count:");
    let kept = (STEPS - BURN_IN) as f64;
    for (k, count) in k_counts.iter().enumerate().skip(1) {
        println!("  k = {}: {:.3}", k, *count as f64 / kept);
    }

    if let Some(means) = trace.return_value() {
        println!("\nFinal means:");
        for (i, m) in means.iter().enumerate() {
            println!("  mu[{}] = {:.4}", i, m);
        }
    }

    println!("\n{}", trace.summary().summary());

    Ok(())
}
