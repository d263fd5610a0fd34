use tracing::trace;

// Counters and histograms go to the installed Prometheus recorder; the trace
// events mirror them for log-only deployments.

pub fn inc_requests(route: &'static str) {
    ::metrics::counter!("studio_requests_total", "route" => route).increment(1);
    trace!(
        target = "studio.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    ::metrics::histogram!("studio_stage_duration_ms", "stage" => stage).record(elapsed_ms as f64);
    trace!(
        target = "studio.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn llm_fallback(component: &'static str) {
    ::metrics::counter!("studio_llm_fallback_total", "component" => component).increment(1);
    trace!(
        target = "studio.metrics",
        component = component,
        "llm_fallback_total_inc"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn helpers_reach_the_prometheus_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            inc_requests("/api/generate/detailpage");
            inc_requests("/api/generate/detailpage");
            llm_fallback("swot");
            stage_elapsed("export", 12);
        });

        let body = handle.render();
        assert!(body.contains(r#"studio_requests_total{route="/api/generate/detailpage"} 2"#));
        assert!(body.contains(r#"studio_llm_fallback_total{component="swot"} 1"#));
        assert!(body.contains("studio_stage_duration_ms"));
    }
}
