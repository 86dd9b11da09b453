//! IPC message dispatch: parse s-expressions and route to handlers.

use chrono::Utc;
use lexpr::Value;
use tracing::{debug, warn};

use crate::proof::ProofTunables;
use crate::state::EngineState;

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut EngineState, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);
    debug!(msg_id, "ipc message: {:?}", msg_type);

    match msg_type.as_deref() {
        Some("ping") => handle_ping(msg_id, &value),
        Some("pipeline-status") => handle_pipeline_status(state, msg_id),
        Some("lighting-status") => handle_lighting_status(state, msg_id),
        Some("consensus-config") => handle_consensus_config(state, msg_id, &value),
        Some("classifier-config") => handle_classifier_config(state, msg_id, &value),
        Some("session-reset") => handle_session_reset(state, msg_id),
        Some("run-start") => handle_run_start(state, msg_id, &value),
        Some("run-status") => handle_run_status(state, msg_id),
        Some("run-abort") => handle_run_abort(state, msg_id),
        Some("submission-status") => handle_submission_status(state, msg_id, &value),
        Some("catalog-list") => handle_catalog_list(state, msg_id),
        Some(other) => Some(error_response(
            msg_id,
            &format!("unknown message type: {other}"),
        )),
        None => Some(error_response(msg_id, "missing :type")),
    }
}

fn handle_ping(msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    let server_ts = Utc::now().timestamp_millis();

    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id, client_ts, server_ts
    ))
}

// ── Pipeline handlers ──────────────────────────────────────

fn handle_pipeline_status(state: &mut EngineState, msg_id: i64) -> Option<String> {
    let status = state.session.status_sexp();
    Some(format!(
        "(:type :response :id {} :status :ok :pipeline {})",
        msg_id, status
    ))
}

fn handle_lighting_status(state: &mut EngineState, msg_id: i64) -> Option<String> {
    let status = state.session.lighting.status_sexp();
    Some(format!(
        "(:type :response :id {} :status :ok :lighting {})",
        msg_id, status
    ))
}

fn handle_consensus_config(state: &mut EngineState, msg_id: i64, value: &Value) -> Option<String> {
    let mut config = state.session.voter.config.clone();

    if let Some(size) = get_keyword(value, "window-size") {
        match size.parse::<usize>() {
            Ok(s) if (1..=32).contains(&s) => config.window_size = s,
            _ => return Some(error_response(msg_id, "invalid :window-size (1-32)")),
        }
    }
    if let Some(hits) = get_keyword(value, "required-hits") {
        match hits.parse::<usize>() {
            Ok(h) if h >= 1 && h <= config.window_size => config.required_hits = h,
            _ => {
                return Some(error_response(
                    msg_id,
                    &format!("invalid :required-hits (1-{})", config.window_size),
                ))
            }
        }
    }
    if let Some(conf) = get_keyword(value, "min-confidence") {
        match conf.parse::<f32>() {
            Ok(c) if (0.0..=1.0).contains(&c) => config.min_confidence = c,
            _ => return Some(error_response(msg_id, "invalid :min-confidence (0.0-1.0)")),
        }
    }
    if let Some(ttl) = get_keyword(value, "ttl-ms") {
        match ttl.parse::<f64>() {
            Ok(t) if t > 0.0 && t <= 10_000.0 => config.ttl_ms = t,
            _ => return Some(error_response(msg_id, "invalid :ttl-ms (1-10000)")),
        }
    }
    if config.required_hits > config.window_size {
        return Some(error_response(msg_id, ":required-hits exceeds :window-size"));
    }
    let tunables = ProofTunables {
        cooldown_ms: state.config.run.sign_cooldown_ms,
        vote_required_hits: config.required_hits,
        vote_min_confidence: config.min_confidence,
    };
    if let Err(e) = state.config.verifier.admits(&tunables) {
        return Some(error_response(msg_id, &format!("run proofs would be rejected: {e}")));
    }

    if config != state.session.voter.config {
        debug!("consensus config updated: {:?}", config);
        state.session.voter.config = config.clone();
        state.session.voter.reset();
        state.config.consensus = config;
    }
    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.session.voter.config_sexp()
    ))
}

fn handle_classifier_config(state: &mut EngineState, msg_id: i64, value: &Value) -> Option<String> {
    let mut config = state.session.classifier.config.clone();

    if let Some(k) = get_keyword(value, "k") {
        match k.parse::<usize>() {
            Ok(k) if (1..=15).contains(&k) => config.k = k,
            _ => return Some(error_response(msg_id, "invalid :k (1-15)")),
        }
    }
    if let Some(d) = get_float(value, "reject-distance") {
        if d.is_finite() && d > 0.0 {
            config.reject_distance = d as f32;
        } else {
            return Some(error_response(msg_id, "invalid :reject-distance (> 0)"));
        }
    } else if get_keyword(value, "reject-distance").is_some() {
        return Some(error_response(msg_id, "invalid :reject-distance (> 0)"));
    }

    state.session.classifier.config = config.clone();
    state.config.classifier = config;
    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.session.classifier.config_sexp()
    ))
}

fn handle_session_reset(state: &mut EngineState, msg_id: i64) -> Option<String> {
    state.reset();
    Some(ok_response(msg_id))
}

// ── Run handlers ───────────────────────────────────────────

fn handle_run_start(state: &mut EngineState, msg_id: i64, value: &Value) -> Option<String> {
    let Some(jutsu) = get_string(value, "jutsu") else {
        return Some(error_response(msg_id, "missing :jutsu"));
    };
    let now_ms = get_float(value, "now-ms").unwrap_or(state.clock_ms);

    match state.start_run(&jutsu, now_ms, Utc::now()) {
        Ok(token) => Some(format!(
            "(:type :response :id {} :status :ok :token \"{}\")",
            msg_id,
            escape_string(&token)
        )),
        Err(e) => Some(error_response(msg_id, &e.to_string())),
    }
}

fn handle_run_status(state: &mut EngineState, msg_id: i64) -> Option<String> {
    let run = match &state.run {
        Some(run) => run.status_sexp(state.clock_ms),
        None => "nil".to_string(),
    };
    let last = match &state.last_token {
        Some(token) => format!("\"{}\"", escape_string(token)),
        None => "nil".to_string(),
    };
    Some(format!(
        "(:type :response :id {} :status :ok :run {} :last-token {})",
        msg_id, run, last
    ))
}

fn handle_run_abort(state: &mut EngineState, msg_id: i64) -> Option<String> {
    match state.abort_run() {
        Ok(()) => Some(ok_response(msg_id)),
        Err(e) => Some(error_response(msg_id, &e.to_string())),
    }
}

fn handle_submission_status(state: &mut EngineState, msg_id: i64, value: &Value) -> Option<String> {
    let Some(token) = get_string(value, "token").or_else(|| state.last_token.clone()) else {
        return Some(error_response(msg_id, "no :token given and no finished run"));
    };

    // Settle anything pending before reporting.
    state.drain_submissions(Utc::now());

    match state.submissions.status(&token) {
        Some(status) => Some(format!(
            "(:type :response :id {} :status :ok :token \"{}\" :submission {})",
            msg_id,
            escape_string(&token),
            status.sexp()
        )),
        None => Some(error_response(msg_id, &format!("unknown token: {token}"))),
    }
}

fn handle_catalog_list(state: &mut EngineState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :jutsu {})",
        msg_id,
        state.catalog.list_sexp()
    ))
}

// ── Helpers ────────────────────────────────────────────────

fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract a keyword value from an s-expression plist.
/// Walks cons pairs directly to find `:key` followed by its value.
/// Handles both `Value::Keyword("key")` (elisp parser) and
/// `Value::Symbol(":key")` (default parser) forms.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let car = pair.car();
        let is_key = match car {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            // Value is the car of the next cons cell
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return match val {
                Value::Keyword(v) => Some(v.to_string()),
                Value::Symbol(v) => {
                    let s = v.to_string();
                    Some(s.strip_prefix(':').unwrap_or(&s).to_string())
                }
                Value::String(v) => Some(v.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
                Value::Null => Some("nil".to_string()),
                _ => Some(val.to_string()),
            };
        }
        current = pair.cdr();
    }
    None
}

/// Extract an integer value from an s-expression plist.
fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Extract a string value from an s-expression plist.
fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

/// Extract a floating-point value from an s-expression plist.
fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}
