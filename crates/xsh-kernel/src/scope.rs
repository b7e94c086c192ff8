//! Variable scope management.
//!
//! A scope is the per-evaluation variable map, layered over the engine's
//! global store: lookup prefers the local binding, falls back to the global
//! one. Dotted-path reads short-circuit to undefined on the first null link,
//! chain through deferred intermediates, and bind callables to the mapping
//! they were found on. Path writes refuse deferred intermediates and create
//! missing ones as mappings.
//!
//! Reserved names: `context` (piped value), `template` / `offset` /
//! `templateOffset` (template state), `global` (host ambient bridge).
//! Placeholder names generated by the normalizer use a reserved `_` second
//! character (`__<hash>`) so they cannot collide with user variables.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;

use xsh_types::{check_param, Deferred, Error, Map, Value, XshResult};

/// The engine-wide variable store shared by every scope of an engine.
pub(crate) type GlobalStore = Arc<Mutex<HashMap<String, Value>>>;

/// True for `$name` references.
pub fn is_variable(token: &str) -> bool {
    token.starts_with('$')
}

/// True for `$$name` references (force-evaluation of the referenced slot).
pub fn is_runnable_variable(token: &str) -> bool {
    token.starts_with("$$")
}

/// String form of a path key (`Int(4)` indexes a mapping as `"4"`).
pub fn key_name(key: &Value) -> String {
    match key {
        Value::Str(s) => s.clone(),
        other => other.display(),
    }
}

/// Per-evaluation variable bindings over the engine's global store.
pub struct Scope {
    vars: HashMap<String, Value>,
    globals: GlobalStore,
    placeholder_seq: u64,
}

impl Scope {
    pub(crate) fn with_globals(globals: GlobalStore) -> Self {
        Self {
            vars: HashMap::new(),
            globals,
            placeholder_seq: 0,
        }
    }

    fn lock_globals(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.globals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look a name up: local binding first, then the global store.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.vars.get(name) {
            return Some(v.clone());
        }
        self.lock_globals().get(name).cloned()
    }

    /// Look a name up in the local bindings only.
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    /// Bind a name in the local scope.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Remove a local binding, returning it.
    pub fn take_local(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Store a normalizer placeholder and return its generated name.
    pub fn add_placeholder(&mut self, value: Value) -> String {
        self.placeholder_seq += 1;
        let mut hasher = DefaultHasher::new();
        self.placeholder_seq.hash(&mut hasher);
        value.display().hash(&mut hasher);
        let name = format!("__{:x}", hasher.finish());
        self.vars.insert(name.clone(), value);
        name
    }

    /// Read a dotted path. The head resolves through local-then-global
    /// lookup; every later key applies one traversal step. A nullish link
    /// short-circuits to `default`; a deferred link moves the remaining keys
    /// into the deferred's continuation.
    pub fn get_path(&self, keys: &[Value], default: Value) -> XshResult<Value> {
        let Some(head) = keys.first() else {
            return Ok(default);
        };
        let mut cur = match self.get(&key_name(head)) {
            Some(v) => v,
            None => return Ok(default),
        };
        for (i, key) in keys.iter().enumerate().skip(1) {
            if cur.is_nullish() {
                return Ok(default);
            }
            if let Value::Deferred(d) = cur {
                let rest: Vec<Value> = keys[i..].to_vec();
                return Ok(Value::Deferred(Deferred::new(walk_deferred(
                    d, rest, default,
                ))));
            }
            cur = step(&cur, key);
        }
        Ok(cur)
    }

    /// Write a dotted path. The head is updated where it lives (local
    /// binding, else global, else a fresh local mapping); intermediate links
    /// are created as mappings when missing. Writing through a deferred
    /// intermediate is an error.
    pub fn set_path(&mut self, keys: &[Value], value: Value) -> XshResult<()> {
        let Some(head) = keys.first() else {
            return check_param(false, "path", "must not be empty");
        };
        let head = key_name(head);
        if keys.len() == 1 {
            self.set(head, value);
            return Ok(());
        }
        if let Some(root) = self.vars.get_mut(&head) {
            return assign_into(root, &keys[1..], value);
        }
        {
            let mut globals = self.globals.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(root) = globals.get_mut(&head) {
                return assign_into(root, &keys[1..], value);
            }
        }
        let mut root = Value::Map(Map::new());
        assign_into(&mut root, &keys[1..], value)?;
        self.vars.insert(head, root);
        Ok(())
    }
}

/// One traversal step: resolve `key` against `parent`. Missing members yield
/// `Undef`; a callable found on a mapping comes back bound to that mapping.
fn step(parent: &Value, key: &Value) -> Value {
    match parent {
        Value::Map(map) => match map.get(&key_name(key)) {
            Some(Value::Fn(f)) => Value::Fn(f.bind(parent.clone())),
            Some(v) => v.clone(),
            None => Value::Undef,
        },
        Value::Seq(items) => seq_index(key)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Undef),
        _ => Value::Undef,
    }
}

fn seq_index(key: &Value) -> Option<usize> {
    match key {
        Value::Int(i) if *i >= 0 => Some(*i as usize),
        Value::Str(s) => s.parse::<usize>().ok(),
        _ => None,
    }
}

/// Await a value until it is no longer deferred.
pub(crate) async fn settle(mut value: Value) -> XshResult<Value> {
    loop {
        match value {
            Value::Deferred(d) => value = d.wait().await?,
            other => return Ok(other),
        }
    }
}

/// Continuation of a path read that hit a deferred link: await it, then keep
/// applying the remaining keys, awaiting any further deferred intermediates.
async fn walk_deferred(first: Deferred, keys: Vec<Value>, default: Value) -> XshResult<Value> {
    let mut cur = first.wait().await?;
    for key in &keys {
        cur = settle(cur).await?;
        if cur.is_nullish() {
            return Ok(default);
        }
        cur = step(&cur, key);
    }
    Ok(cur)
}

fn assign_into(root: &mut Value, keys: &[Value], value: Value) -> XshResult<()> {
    let mut cur = root;
    let Some((last, intermediate)) = keys.split_last() else {
        return check_param(false, "path", "must not be empty");
    };
    for key in intermediate {
        cur = descend(cur, &key_name(key))?;
    }
    let key = key_name(last);
    match cur {
        Value::Deferred(_) => Err(deferred_write_error(&key)),
        Value::Map(map) => {
            map.insert(key, value);
            Ok(())
        }
        Value::Seq(items) => match key.parse::<usize>() {
            Ok(i) if i < items.len() => {
                items[i] = value;
                Ok(())
            }
            Ok(i) if i == items.len() => {
                items.push(value);
                Ok(())
            }
            _ => Err(Error::property_type_mismatch(json!({
                "property": key,
                "message": "sequence index out of range",
            }))),
        },
        other => {
            let mut map = Map::new();
            map.insert(key, value);
            *other = Value::Map(map);
            Ok(())
        }
    }
}

/// Move one level down for a write, materializing mappings along the way.
fn descend<'v>(cur: &'v mut Value, key: &str) -> XshResult<&'v mut Value> {
    match cur {
        Value::Deferred(_) => Err(deferred_write_error(key)),
        Value::Seq(items) => match key.parse::<usize>() {
            Ok(i) if i < items.len() => Ok(&mut items[i]),
            _ => Err(Error::property_type_mismatch(json!({
                "property": key,
                "message": "sequence index out of range",
            }))),
        },
        Value::Map(map) => Ok(map.entry_or_insert(key, Value::Map(Map::new()))),
        other => {
            *other = Value::Map(Map::new());
            let Value::Map(map) = other else { unreachable!() };
            Ok(map.entry_or_insert(key, Value::Map(Map::new())))
        }
    }
}

fn deferred_write_error(key: &str) -> Error {
    Error::property_type_mismatch(json!({
        "property": key,
        "message": "cannot write through a deferred value",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::with_globals(Arc::new(Mutex::new(HashMap::new())))
    }

    fn keys(parts: &[&str]) -> Vec<Value> {
        parts.iter().map(|p| Value::Str(p.to_string())).collect()
    }

    #[test]
    fn local_shadows_global() {
        let globals: GlobalStore = Arc::new(Mutex::new(HashMap::new()));
        globals.lock().unwrap().insert("x".into(), Value::Int(1));
        let mut s = Scope::with_globals(globals);
        assert_eq!(s.get("x"), Some(Value::Int(1)));
        s.set("x", Value::Int(2));
        assert_eq!(s.get("x"), Some(Value::Int(2)));
    }

    #[test]
    fn path_read_short_circuits_on_null() {
        let mut s = scope();
        s.set("a", Value::Null);
        let v = s.get_path(&keys(&["a", "b", "c"]), Value::Int(9)).unwrap();
        assert_eq!(v, Value::Int(9));
    }

    #[test]
    fn path_read_through_maps_and_seqs() {
        let mut s = scope();
        let mut inner = Map::new();
        inner.insert("baz", Value::Seq(vec![Value::Int(1), Value::Int(2)]));
        let mut outer = Map::new();
        outer.insert("bar", Value::Map(inner));
        s.set("foo", Value::Map(outer));
        let v = s
            .get_path(
                &[
                    Value::Str("foo".into()),
                    Value::Str("bar".into()),
                    Value::Str("baz".into()),
                    Value::Int(1),
                ],
                Value::Undef,
            )
            .unwrap();
        assert_eq!(v, Value::Int(2));
    }

    #[test]
    fn path_read_binds_methods_to_parent() {
        let mut s = scope();
        let mut obj = Map::new();
        obj.insert("tag", Value::Str("it".into()));
        obj.insert(
            "get_tag",
            Value::Fn(xsh_types::Callable::native("get_tag", |recv, _| {
                let Some(Value::Map(m)) = recv else {
                    return Ok(Value::Undef);
                };
                Ok(m.get("tag").cloned().unwrap_or(Value::Undef))
            })),
        );
        s.set("obj", Value::Map(obj));
        let v = s.get_path(&keys(&["obj", "get_tag"]), Value::Undef).unwrap();
        let Value::Fn(f) = v else { panic!("expected a bound callable") };
        assert_eq!(f.invoke(&[]).unwrap(), Value::Str("it".into()));
    }

    #[tokio::test]
    async fn path_read_chains_through_deferred() {
        let mut s = scope();
        s.set(
            "var5",
            Value::Seq(vec![
                Value::Int(1),
                Value::Deferred(Deferred::ready(Value::Seq(vec![
                    Value::Int(7),
                    Value::Int(3),
                ]))),
            ]),
        );
        let v = s
            .get_path(
                &[Value::Str("var5".into()), Value::Int(1), Value::Int(0)],
                Value::Undef,
            )
            .unwrap();
        let Value::Deferred(d) = v else { panic!("expected a deferred read") };
        assert_eq!(d.wait().await.unwrap(), Value::Int(7));
    }

    #[test]
    fn path_write_creates_mappings() {
        let mut s = scope();
        s.set_path(
            &[
                Value::Str("var1".into()),
                Value::Str("foo".into()),
                Value::Int(4),
            ],
            Value::Int(4),
        )
        .unwrap();
        let v = s
            .get_path(
                &[Value::Str("var1".into()), Value::Str("foo".into()), Value::Int(4)],
                Value::Undef,
            )
            .unwrap();
        assert_eq!(v, Value::Int(4));
    }

    #[test]
    fn path_write_indexes_existing_sequences() {
        let mut s = scope();
        s.set("xs", Value::Seq(vec![Value::Int(1), Value::Int(2)]));
        s.set_path(&[Value::Str("xs".into()), Value::Int(1)], Value::Int(9))
            .unwrap();
        assert_eq!(
            s.get("xs"),
            Some(Value::Seq(vec![Value::Int(1), Value::Int(9)]))
        );
    }

    #[test]
    fn empty_path_write_is_rejected() {
        let mut s = scope();
        let err = s.set_path(&[], Value::Int(1)).unwrap_err();
        assert!(matches!(err, Error::ParameterTypeInvalid(_)));
    }

    #[test]
    fn path_write_rejects_deferred_intermediate() {
        let mut s = scope();
        s.set("d", Value::Deferred(Deferred::ready(Value::Null)));
        let err = s
            .set_path(&keys(&["d", "x"]), Value::Int(1))
            .unwrap_err();
        assert!(matches!(err, Error::PropertyTypeMismatch(_)));
    }

    #[test]
    fn placeholders_use_reserved_prefix() {
        let mut s = scope();
        let a = s.add_placeholder(Value::Int(1));
        let b = s.add_placeholder(Value::Int(1));
        assert!(a.starts_with("__"));
        assert_ne!(a, b);
        assert_eq!(s.get(&a), Some(Value::Int(1)));
    }

    #[test]
    fn variable_predicates() {
        assert!(is_variable("$x"));
        assert!(!is_variable("x"));
        assert!(is_runnable_variable("$$x"));
        assert!(!is_runnable_variable("$x"));
    }
}
