use futures_util::future::join_all;
use std::fmt::Display;
use std::future::Future;
use tracing::{error, info};

/// Per-item outcome of a fan-out. There is no aggregate status.
#[derive(Debug)]
pub struct BatchReport<T, E> {
    pub items: Vec<(String, Result<T, E>)>,
}

impl<T, E> BatchReport<T, E> {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items
            .iter()
            .filter_map(|(label, r)| r.as_ref().ok().map(|v| (label.as_str(), v)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &E)> {
        self.items
            .iter()
            .filter_map(|(label, r)| r.as_ref().err().map(|e| (label.as_str(), e)))
    }
}

/// Runs every unit concurrently and waits for all of them.
///
/// Each failure is logged on its own; the other units run to completion.
/// Results come back in input order.
pub async fn run_all<I, F, T, E>(units: I) -> BatchReport<T, E>
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let (labels, futures): (Vec<String>, Vec<F>) = units.into_iter().unzip();
    let results = join_all(futures).await;

    let items: Vec<_> = labels.into_iter().zip(results).collect();
    for (label, result) in &items {
        match result {
            Ok(_) => info!("{}: done", label),
            Err(err) => error!("{}: {:#}", label, err),
        }
    }

    BatchReport { items }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_other_units() {
        let units = (0..4u64).map(|i| {
            let fut = async move {
                tokio::time::sleep(Duration::from_secs(4 - i)).await;
                if i == 1 { Err(format!("unit {i} broke")) } else { Ok(i * 10) }
            };
            (format!("unit-{i}"), fut)
        });

        let report = run_all(units).await;

        let ok: Vec<_> = report.succeeded().map(|(l, v)| (l.to_string(), *v)).collect();
        assert_eq!(
            ok,
            vec![("unit-0".to_string(), 0), ("unit-2".to_string(), 20), ("unit-3".to_string(), 30)]
        );
        let failed: Vec<_> = report.failed().map(|(l, _)| l).collect();
        assert_eq!(failed, vec!["unit-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn units_run_concurrently() {
        let started = tokio::time::Instant::now();
        let units = (0..5).map(|i| {
            (format!("u{i}"), async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, String>(i)
            })
        });

        let report = run_all(units).await;

        assert_eq!(report.items.len(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}
