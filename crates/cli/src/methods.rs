use std::time::Duration;

use drudge_pool::{MethodRegistry, RegistryError};
use serde_json::{json, Value};

fn first_u64(args: &[Value]) -> Result<u64, String> {
    args.first()
        .and_then(Value::as_u64)
        .ok_or_else(|| "expected an unsigned integer argument".to_string())
}

fn fib(n: u64) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a.wrapping_add(b));
    }
    a
}

/// Methods the demo workers expose.
pub fn registry() -> Result<MethodRegistry, RegistryError> {
    let mut registry = MethodRegistry::new();
    registry.register("sleep", |args| {
        let ms = first_u64(&args)?;
        std::thread::sleep(Duration::from_millis(ms));
        Ok(json!(ms))
    })?;
    registry.register("fib", |args| Ok(json!(fib(first_u64(&args)?))))?;
    registry.register("fail", |args| {
        Err(format!("demo failure for {}", args.first().unwrap_or(&Value::Null)))
    })?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fib_sequence() {
        let values: Vec<u64> = (0..8).map(fib).collect();
        assert_eq!(values, vec![0, 1, 1, 2, 3, 5, 8, 13]);
    }

    #[test]
    fn registry_lists_demo_methods() {
        let registry = registry().unwrap();
        assert!(registry.resolves("sleep"));
        assert!(registry.resolves("fib"));
        assert!(registry.resolves("fail"));
        assert!(!registry.resolves("nope"));
    }
}
