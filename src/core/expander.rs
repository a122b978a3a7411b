//! Cartesian expansion of a group entry's contexts into bindings.
//!
//! Contexts are processed head to tail, the head being the outermost loop.
//! A `range` context contributes one binding per list element; any other
//! context binds its whole value. No contexts yield a single empty binding.

use super::error::{Error, Result};
use super::parser::TemplateContext;
use super::scope::ValueLookup;
use super::types::ValueMap;

/// Every binding of `contexts`, in nested-loop order.
pub fn bindings(
    resource: &str,
    contexts: &[TemplateContext],
    scope: &dyn ValueLookup,
) -> Result<Vec<ValueMap>> {
    let mut out = Vec::new();
    let mut current = ValueMap::new();
    product(resource, contexts, scope, &mut current, &mut out)?;
    Ok(out)
}

fn product(
    resource: &str,
    contexts: &[TemplateContext],
    scope: &dyn ValueLookup,
    current: &mut ValueMap,
    out: &mut Vec<ValueMap>,
) -> Result<()> {
    let Some((head, rest)) = contexts.split_first() else {
        out.push(current.clone());
        return Ok(());
    };
    if !head.value.is_ready(scope) {
        return Err(Error::ResourceNotReady(format!(
            "{} (context {})",
            resource, head.name
        )));
    }
    let value = head.value.get_value(scope)?;
    if head.range {
        // An empty list contributes a zero factor: the body never runs, unlike
        // a fallback to one empty binding.
        let items = value.elements().ok_or_else(|| Error::TypeMismatch {
            declaration: head.value.declaration().to_string(),
            kind: head.kind,
        })?;
        for item in items {
            current.insert(head.name.clone(), item);
            product(resource, rest, scope, current, out)?;
        }
    } else {
        current.insert(head.name.clone(), value);
        product(resource, rest, scope, current, out)?;
    }
    current.shift_remove(&head.name);
    Ok(())
}
