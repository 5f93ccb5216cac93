use rand::Rng;
use tracing::{Span, instrument};

/// Metropolis acceptance probability `min(1, bias * exp(-beta * delta))`.
///
/// Downhill moves (`delta <= 0`) with no bias are always accepted, which keeps the rule
/// well defined even when `delta` is a sentinel-sized negative number.
pub fn metropolis_probability(delta: f64, beta: f64, bias: f64) -> f64 {
    if delta <= 0.0 && bias >= 1.0 {
        return 1.0;
    }
    acceptance_probability(-beta * delta + bias.ln())
}

/// Converts a log acceptance ratio into a probability in `[0, 1]`.
///
/// NaN (e.g. from `inf - inf`) is treated as a rejection.
pub fn acceptance_probability(ln_ratio: f64) -> f64 {
    if ln_ratio.is_nan() {
        tracing::warn!("Acceptance ratio evaluated to NaN; treating the proposal as rejected.");
        return 0.0;
    }
    if ln_ratio >= 0.0 {
        1.0
    } else {
        ln_ratio.exp()
    }
}

/// Draws a Bernoulli outcome with success probability `p`.
#[instrument(level = "trace", skip_all, fields(p))]
pub fn accept<R: Rng + ?Sized>(p: f64, rng: &mut R) -> bool {
    Span::current().record("p", p);
    if p >= 1.0 {
        return true;
    }
    if p <= 0.0 {
        return false;
    }
    rng.r#gen::<f64>() < p
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn downhill_moves_are_always_accepted() {
        assert_eq!(metropolis_probability(-1.0, 1.0, 1.0), 1.0);
        assert_eq!(metropolis_probability(0.0, 1.0, 1.0), 1.0);
        assert_eq!(metropolis_probability(-1e100, 1.0, 1.0), 1.0);
    }

    #[test]
    fn uphill_moves_follow_boltzmann_factor() {
        let p = metropolis_probability(2.0, 0.5, 1.0);
        assert!((p - (-1.0f64).exp()).abs() < 1e-15);
        assert_eq!(metropolis_probability(1e100, 1.0, 1.0), 0.0);
    }

    #[test]
    fn bias_scales_the_probability() {
        let p = metropolis_probability(1.0, 1.0, 0.5);
        assert!((p - 0.5 * (-1.0f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn nan_ratio_is_rejected() {
        assert_eq!(acceptance_probability(f64::NAN), 0.0);
    }

    #[test]
    fn accept_records_the_probability_on_its_span() {
        use std::sync::{Arc, Mutex};
        use tracing::field::{Field, Visit};
        use tracing::span;
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        struct ProbabilityVisitor<'a>(&'a Mutex<Vec<f64>>);

        impl Visit for ProbabilityVisitor<'_> {
            fn record_f64(&mut self, field: &Field, value: f64) {
                if field.name() == "p" {
                    self.0.lock().unwrap().push(value);
                }
            }

            fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
        }

        struct RecordedProbabilities(Arc<Mutex<Vec<f64>>>);

        impl<S: tracing::Subscriber> Layer<S> for RecordedProbabilities {
            fn on_record(&self, _id: &span::Id, values: &span::Record<'_>, _ctx: Context<'_, S>) {
                values.record(&mut ProbabilityVisitor(&self.0));
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber =
            tracing_subscriber::registry().with(RecordedProbabilities(Arc::clone(&seen)));
        let mut rng = StdRng::seed_from_u64(1);
        tracing::subscriber::with_default(subscriber, || {
            accept(0.25, &mut rng);
            accept(1.0, &mut rng);
        });
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 1.0]);
    }

    #[test]
    fn accept_respects_certain_outcomes() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!((0..100).all(|_| accept(1.0, &mut rng)));
        assert!((0..100).all(|_| !accept(0.0, &mut rng)));
        let hits = (0..10_000).filter(|_| accept(0.25, &mut rng)).count();
        assert!((hits as f64 / 10_000.0 - 0.25).abs() < 0.02);
    }
}
