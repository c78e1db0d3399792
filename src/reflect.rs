//! Reflective property access on host values: the dynamic object protocol
//! behind `valueGet`, `valueSet`, `valueDelete`, `valueIndex`,
//! `valueSetIndex` and `valueLength`.

use crate::error::Error;
use crate::table::ValueTable;
use crate::value::Value;

/// A property key as the guest sends it: a name for objects, an index for
/// arrays.
pub(crate) enum Key<'a> {
    Name(&'a str),
    Index(i64),
}

/// A `null`/`undefined` owner means the global object.
fn resolve<'v>(table: &'v ValueTable, owner: &'v Value) -> &'v Value {
    if owner.is_nullish() {
        table.global()
    } else {
        owner
    }
}

pub(crate) fn get(table: &ValueTable, owner: &Value, key: Key<'_>) -> Result<Value, Error> {
    let owner = resolve(table, owner);
    match key {
        Key::Name(name) => {
            let map = owner.as_object().ok_or(Error::NotAnObject {
                kind: owner.kind(),
            })?;
            Ok(map.borrow().get(name).cloned().unwrap_or(Value::Undefined))
        }
        Key::Index(index) => {
            let elems = owner.as_array().ok_or(Error::NotAnArray {
                kind: owner.kind(),
            })?;
            let elems = elems.borrow();
            match usize::try_from(index) {
                Ok(i) if i < elems.len() => Ok(elems[i].clone()),
                _ => Ok(Value::Undefined),
            }
        }
    }
}

pub(crate) fn set(
    table: &ValueTable,
    owner: &Value,
    key: Key<'_>,
    value: Value,
) -> Result<(), Error> {
    let owner = resolve(table, owner);
    match key {
        Key::Name(name) => {
            let map = owner.as_object().ok_or(Error::NotAnObject {
                kind: owner.kind(),
            })?;
            map.borrow_mut().insert(name.to_owned(), value);
            Ok(())
        }
        Key::Index(index) => {
            let elems = owner.as_array().ok_or(Error::NotAnArray {
                kind: owner.kind(),
            })?;
            let mut elems = elems.borrow_mut();
            // out-of-range assignment is a silent no-op
            if let Ok(i) = usize::try_from(index) {
                if i < elems.len() {
                    elems[i] = value;
                }
            }
            Ok(())
        }
    }
}

pub(crate) fn delete(table: &ValueTable, owner: &Value, key: Key<'_>) -> Result<(), Error> {
    let owner = resolve(table, owner);
    match key {
        Key::Name(name) => {
            let map = owner.as_object().ok_or(Error::NotAnObject {
                kind: owner.kind(),
            })?;
            map.borrow_mut().remove(name);
            Ok(())
        }
        Key::Index(index) => {
            let elems = owner.as_array().ok_or(Error::NotAnArray {
                kind: owner.kind(),
            })?;
            let mut elems = elems.borrow_mut();
            // splice the element out when in range, no-op otherwise
            if let Ok(i) = usize::try_from(index) {
                if i < elems.len() {
                    elems.remove(i);
                }
            }
            Ok(())
        }
    }
}

/// Element count for arrays; `None` for everything else, in which case the
/// import writes nothing back.
pub(crate) fn length(v: &Value) -> Option<i64> {
    v.as_array().map(|elems| elems.borrow().len() as i64)
}
