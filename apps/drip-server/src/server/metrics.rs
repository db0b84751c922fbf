use std::{collections::HashMap, fmt::Write as _, sync::Mutex};

use super::core::{MetricsState, METRICS_STATE};

pub(crate) const COMPONENT_COLLECTOR: &str = "collector";
pub(crate) const COMPONENT_DRAIN: &str = "drain";

pub(crate) fn metrics_state() -> &'static MetricsState {
    METRICS_STATE.get_or_init(MetricsState::default)
}

fn snapshot<K: Clone>(counters: &Mutex<HashMap<K, u64>>) -> HashMap<K, u64> {
    counters
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone())
}

fn bump<K: Eq + std::hash::Hash>(counters: &Mutex<HashMap<K, u64>>, key: K, by: u64) {
    if let Ok(mut counters) = counters.lock() {
        let entry = counters.entry(key).or_insert(0);
        *entry += by;
    }
}

fn write_header(output: &mut String, name: &str, help: &str) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
}

fn write_by_component(output: &mut String, name: &str, counters: HashMap<&'static str, u64>) {
    let mut entries: Vec<_> = counters.into_iter().collect();
    entries.sort_by_key(|(component, _)| *component);
    for (component, value) in entries {
        let _ = writeln!(output, "{name}{{component=\"{component}\"}} {value}");
    }
}

fn write_by_component_and(
    output: &mut String,
    name: &str,
    label: &str,
    counters: HashMap<(&'static str, &'static str), u64>,
) {
    let mut entries: Vec<_> = counters.into_iter().collect();
    entries.sort_by_key(|((component, other), _)| (*component, *other));
    for ((component, other), value) in entries {
        let _ = writeln!(
            output,
            "{name}{{component=\"{component}\",{label}=\"{other}\"}} {value}"
        );
    }
}

pub(crate) fn render_metrics() -> String {
    let state = metrics_state();
    let admissions = snapshot(&state.admissions);
    let batches_released = snapshot(&state.batches_released);
    let items_released = snapshot(&state.items_released);
    let handler_calls = snapshot(&state.handler_calls);
    let discarded = snapshot(&state.discarded);
    let drain_tasks = state.drain_tasks.lock().map_or(0, |guard| *guard);
    let deny_resets = state.deny_resets.lock().map_or(0, |guard| *guard);

    let mut output = String::new();
    write_header(
        &mut output,
        "drip_admissions_total",
        "Count of enqueue attempts by component and outcome",
    );
    write_by_component_and(&mut output, "drip_admissions_total", "outcome", admissions);

    write_header(
        &mut output,
        "drip_batches_released_total",
        "Count of non-empty windows handed to the batch handler",
    );
    write_by_component(&mut output, "drip_batches_released_total", batches_released);

    write_header(
        &mut output,
        "drip_items_released_total",
        "Count of claims handed to the batch handler",
    );
    write_by_component(&mut output, "drip_items_released_total", items_released);

    write_header(
        &mut output,
        "drip_handler_calls_total",
        "Count of handler calls by component and outcome",
    );
    write_by_component_and(&mut output, "drip_handler_calls_total", "outcome", handler_calls);

    write_header(
        &mut output,
        "drip_drain_tasks_total",
        "Count of tasks taken off the serial drain queue",
    );
    let _ = writeln!(output, "drip_drain_tasks_total {drain_tasks}");

    write_header(
        &mut output,
        "drip_deny_resets_total",
        "Count of bulk cooldown list resets",
    );
    let _ = writeln!(output, "drip_deny_resets_total {deny_resets}");

    write_header(
        &mut output,
        "drip_discarded_total",
        "Count of queued items released unhandled at shutdown",
    );
    write_by_component(&mut output, "drip_discarded_total", discarded);

    output
}

pub(crate) fn record_admission(component: &'static str, outcome: &'static str) {
    bump(&metrics_state().admissions, (component, outcome), 1);
}

pub(crate) fn record_batch_released(component: &'static str, items: usize) {
    bump(&metrics_state().batches_released, component, 1);
    bump(
        &metrics_state().items_released,
        component,
        u64::try_from(items).unwrap_or(u64::MAX),
    );
}

pub(crate) fn record_handler_outcome(component: &'static str, succeeded: bool) {
    let outcome = if succeeded { "ok" } else { "failed" };
    bump(&metrics_state().handler_calls, (component, outcome), 1);
}

pub(crate) fn record_drain_task() {
    if let Ok(mut counter) = metrics_state().drain_tasks.lock() {
        *counter += 1;
    }
}

pub(crate) fn record_deny_reset() {
    if let Ok(mut counter) = metrics_state().deny_resets.lock() {
        *counter += 1;
    }
}

pub(crate) fn record_discarded(component: &'static str, items: usize) {
    if items == 0 {
        return;
    }
    bump(
        &metrics_state().discarded,
        component,
        u64::try_from(items).unwrap_or(u64::MAX),
    );
}

#[cfg(test)]
mod tests {
    use super::{
        metrics_state, record_admission, record_batch_released, record_discarded,
        record_handler_outcome, render_metrics, COMPONENT_COLLECTOR, COMPONENT_DRAIN,
    };

    fn admissions(component: &'static str, outcome: &'static str) -> u64 {
        metrics_state()
            .admissions
            .lock()
            .expect("admission metrics mutex should not be poisoned")
            .get(&(component, outcome))
            .copied()
            .unwrap_or(0)
    }

    #[test]
    fn records_admissions_by_component_and_outcome() {
        let before = admissions(COMPONENT_COLLECTOR, "metrics_test_outcome");
        record_admission(COMPONENT_COLLECTOR, "metrics_test_outcome");
        record_admission(COMPONENT_COLLECTOR, "metrics_test_outcome");

        assert!(admissions(COMPONENT_COLLECTOR, "metrics_test_outcome") >= before + 2);
    }

    #[test]
    fn batch_release_counts_batches_and_items() {
        record_batch_released("metrics_test_batches", 3);
        record_batch_released("metrics_test_batches", 2);

        let state = metrics_state();
        let batches = state.batches_released.lock().unwrap();
        let items = state.items_released.lock().unwrap();
        assert_eq!(batches.get("metrics_test_batches").copied(), Some(2));
        assert_eq!(items.get("metrics_test_batches").copied(), Some(5));
    }

    #[test]
    fn empty_discard_is_not_recorded() {
        record_discarded("metrics_test_discard", 0);

        let discarded = metrics_state().discarded.lock().unwrap();
        assert!(discarded.get("metrics_test_discard").is_none());
    }

    #[test]
    fn renders_prometheus_counters() {
        record_handler_outcome(COMPONENT_DRAIN, false);

        let rendered = render_metrics();

        assert!(rendered.contains("# TYPE drip_handler_calls_total counter"));
        assert!(rendered.contains("drip_handler_calls_total{component=\"drain\",outcome=\"failed\"}"));
        assert!(rendered.contains("drip_deny_resets_total "));
    }
}
