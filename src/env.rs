//! Process-wide settings read from the environment once, at startup.

use std::cell::Cell;

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
struct Env {
    trace_enabled: bool,
    max_steps: Option<u64>,
}

impl Env {
    /// Unset and unparsable values both fall back to the default.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Env {
            trace_enabled: var("C6461_TRACE").is_some_and(|value| value == "1"),
            max_steps: var("C6461_MAX_STEPS").and_then(|value| value.trim().parse().ok()),
        }
    }
}

thread_local! {
    /// `None` until `init`, which reads as all defaults
    static ENV: Cell<Option<Env>> = const { Cell::new(None) };
}

pub fn init() {
    let env = Env::from_vars(|name| std::env::var(name).ok());
    ENV.with(|cell| cell.set(Some(env)));
}

/// `C6461_TRACE=1` turns on per-event tracing for `run`.
pub fn is_trace_enabled() -> bool {
    current().trace_enabled
}

/// `C6461_MAX_STEPS=<n>` is the step limit used when `run` is not given one.
pub fn max_steps() -> Option<u64> {
    current().max_steps
}

fn current() -> Env {
    ENV.with(Cell::get).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn reads_settings() {
        let env = Env::from_vars(vars(&[("C6461_TRACE", "1"), ("C6461_MAX_STEPS", " 200 ")]));
        assert!(env.trace_enabled);
        assert_eq!(env.max_steps, Some(200));
    }

    #[test]
    fn ignores_bad_values() {
        let env = Env::from_vars(vars(&[("C6461_TRACE", "yes"), ("C6461_MAX_STEPS", "-4")]));
        assert_eq!(env, Env::default());
    }

    #[test]
    fn defaults_before_init() {
        assert!(!is_trace_enabled());
        assert_eq!(max_steps(), None);
    }
}
