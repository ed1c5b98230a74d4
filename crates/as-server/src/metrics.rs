//! Hand-rolled Prometheus text exposition. No teacher precedent exists
//! for this (the gateway's own `/v1/metrics` returns plain JSON); built
//! fresh in the teacher's axum-handler idiom but against the general
//! Prometheus exposition format convention instead.

use std::collections::HashMap;

use parking_lot::Mutex;

const DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

#[derive(Default)]
struct Histogram {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            bucket_counts: vec![0; DURATION_BUCKETS.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
            if value <= *bound {
                self.bucket_counts[i] += 1;
            }
        }
    }
}

/// In-process counters and histograms, labeled by agent/status/tool/
/// direction. Lock-free it is not, but operations are O(1) maps guarded
/// by separate mutexes, matching the concurrency model's "per-label
/// guarded maps" policy.
#[derive(Default)]
pub struct Metrics {
    invocations_total: Mutex<HashMap<(String, String), u64>>,
    invocation_duration: Mutex<HashMap<String, Histogram>>,
    tokens_total: Mutex<HashMap<(String, String), u64>>,
    tool_calls_total: Mutex<HashMap<(String, String, String), u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invocation(&self, agent: &str, status: &str, duration_secs: f64) {
        *self
            .invocations_total
            .lock()
            .entry((agent.to_string(), status.to_string()))
            .or_insert(0) += 1;
        self.invocation_duration
            .lock()
            .entry(agent.to_string())
            .or_insert_with(Histogram::new)
            .observe(duration_secs);
    }

    pub fn record_tokens(&self, agent: &str, direction: &str, count: u64) {
        if count == 0 {
            return;
        }
        *self
            .tokens_total
            .lock()
            .entry((agent.to_string(), direction.to_string()))
            .or_insert(0) += count;
    }

    pub fn record_tool_call(&self, agent: &str, tool: &str, status: &str) {
        *self
            .tool_calls_total
            .lock()
            .entry((agent.to_string(), tool.to_string(), status.to_string()))
            .or_insert(0) += 1;
    }

    /// Render the full Prometheus text exposition snapshot.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP agentspec_invocations_total Total agent invocations.\n");
        out.push_str("# TYPE agentspec_invocations_total counter\n");
        for ((agent, status), count) in self.invocations_total.lock().iter() {
            out.push_str(&format!(
                "agentspec_invocations_total{{agent=\"{agent}\",status=\"{status}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP agentspec_invocation_duration_seconds Invocation wall-clock duration.\n");
        out.push_str("# TYPE agentspec_invocation_duration_seconds histogram\n");
        for (agent, hist) in self.invocation_duration.lock().iter() {
            let mut cumulative = 0u64;
            for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
                cumulative += hist.bucket_counts[i];
                out.push_str(&format!(
                    "agentspec_invocation_duration_seconds_bucket{{agent=\"{agent}\",le=\"{bound}\"}} {cumulative}\n"
                ));
            }
            out.push_str(&format!(
                "agentspec_invocation_duration_seconds_bucket{{agent=\"{agent}\",le=\"+Inf\"}} {}\n",
                hist.count
            ));
            out.push_str(&format!(
                "agentspec_invocation_duration_seconds_sum{{agent=\"{agent}\"}} {}\n",
                hist.sum
            ));
            out.push_str(&format!(
                "agentspec_invocation_duration_seconds_count{{agent=\"{agent}\"}} {}\n",
                hist.count
            ));
        }

        out.push_str("# HELP agentspec_tokens_total Total tokens consumed.\n");
        out.push_str("# TYPE agentspec_tokens_total counter\n");
        for ((agent, direction), count) in self.tokens_total.lock().iter() {
            out.push_str(&format!(
                "agentspec_tokens_total{{agent=\"{agent}\",direction=\"{direction}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP agentspec_tool_calls_total Total tool calls by outcome.\n");
        out.push_str("# TYPE agentspec_tool_calls_total counter\n");
        for ((agent, tool, status), count) in self.tool_calls_total.lock().iter() {
            out.push_str(&format!(
                "agentspec_tool_calls_total{{agent=\"{agent}\",tool=\"{tool}\",status=\"{status}\"}} {count}\n"
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_recorded_invocation() {
        let m = Metrics::new();
        m.record_invocation("planner", "ok", 1.5);
        let text = m.render();
        assert!(text.contains("agentspec_invocations_total{agent=\"planner\",status=\"ok\"} 1"));
        assert!(text.contains("agentspec_invocation_duration_seconds_count{agent=\"planner\"} 1"));
    }

    #[test]
    fn zero_token_count_is_not_recorded() {
        let m = Metrics::new();
        m.record_tokens("planner", "in", 0);
        assert!(!m.render().contains("agentspec_tokens_total"));
    }

    #[test]
    fn tool_call_counter_increments() {
        let m = Metrics::new();
        m.record_tool_call("planner", "search", "ok");
        m.record_tool_call("planner", "search", "ok");
        let text = m.render();
        assert!(text.contains(
            "agentspec_tool_calls_total{agent=\"planner\",tool=\"search\",status=\"ok\"} 2"
        ));
    }
}
