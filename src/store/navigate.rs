use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::logic::paths::path_pairs;
use crate::model::{ParamValue, QueryParams, UpdateMode};
use crate::store::traits::StoreError;

/// One `/segment/{param}` pair to walk inside a document: the property
/// holding a nested array and the coerced discriminator value addressing
/// one of its elements.
#[derive(Debug, Clone)]
pub struct NavStep {
    pub segment: String,
    pub param: String,
    pub value: ParamValue,
}

/// Builds the navigator steps for every path pair below the root document.
pub fn nav_steps(params: &QueryParams) -> Vec<NavStep> {
    path_pairs(&params.path)
        .into_iter()
        .skip(1)
        .filter_map(|pair| {
            params.path_params.get(&pair.param).map(|value| NavStep {
                segment: pair.segment,
                param: pair.param,
                value: value.clone(),
            })
        })
        .collect()
}

/// Applies a replace or shallow merge at the node addressed by `steps`.
/// With no steps the mutation applies to the document itself. Returns the
/// new root and the mutated sub-node; the caller persists the root.
pub fn update(doc: Value, steps: &[NavStep], body: &Value, mode: UpdateMode) -> Result<(Value, Value)> {
    if steps.is_empty() {
        let mutated = mutate(doc, body, mode)?;
        return Ok((mutated.clone(), mutated));
    }
    descend(doc, steps, &mut |element| {
        let mutated = mutate(element, body, mode)?;
        Ok((mutated.clone(), mutated))
    })
}

/// Appends `body` to the array property `terminal` of the node addressed by
/// `steps`. Returns the new root and the appended element.
pub fn append(doc: Value, steps: &[NavStep], terminal: &str, body: &Value) -> Result<(Value, Value)> {
    if !body.is_object() {
        return Err(anyhow!(StoreError::BadShape(
            "body must be a JSON object".to_string()
        )));
    }

    let push = &mut |element: Value| -> Result<(Value, Value)> {
        let Value::Object(mut map) = element else {
            return Err(anyhow!(StoreError::NotFound));
        };
        let slot = map.get_mut(terminal).ok_or_else(|| anyhow!(StoreError::NotFound))?;
        let Value::Array(items) = slot else {
            return Err(anyhow!(StoreError::NotFound));
        };
        items.push(body.clone());
        Ok((Value::Object(map), body.clone()))
    };

    if steps.is_empty() {
        push(doc)
    } else {
        descend(doc, steps, push)
    }
}

/// Splices the element addressed by the last step out of its array,
/// preserving the order of the remaining elements. Returns the new root.
pub fn remove(doc: Value, steps: &[NavStep]) -> Result<Value> {
    let Some((last, rest)) = steps.split_last() else {
        return Err(anyhow!(StoreError::NotFound));
    };

    let splice = &mut |element: Value| -> Result<(Value, Value)> {
        let Value::Object(mut map) = element else {
            return Err(anyhow!(StoreError::NotFound));
        };
        let slot = map.get_mut(&last.segment).ok_or_else(|| anyhow!(StoreError::NotFound))?;
        let Value::Array(items) = slot else {
            return Err(anyhow!(StoreError::NotFound));
        };
        let index = find_element(items, &last.param, &last.value)
            .ok_or_else(|| anyhow!(StoreError::NotFound))?;
        items.remove(index);
        Ok((Value::Object(map), Value::Null))
    };

    let (root, _) = if rest.is_empty() {
        splice(doc)?
    } else {
        descend(doc, rest, splice)?
    };
    Ok(root)
}

// Walks the steps down to the addressed array element, applies `terminal`
// to it, and rebuilds the document tree around the returned node.
fn descend(
    doc: Value,
    steps: &[NavStep],
    terminal: &mut dyn FnMut(Value) -> Result<(Value, Value)>,
) -> Result<(Value, Value)> {
    let step = &steps[0];

    let Value::Object(mut map) = doc else {
        return Err(anyhow!(StoreError::NotFound));
    };
    let slot = map
        .get_mut(&step.segment)
        .ok_or_else(|| anyhow!(StoreError::NotFound))?;
    let Value::Array(items) = slot else {
        return Err(anyhow!(StoreError::NotFound));
    };

    let index = find_element(items, &step.param, &step.value)
        .ok_or_else(|| anyhow!(StoreError::NotFound))?;

    let element = items[index].take();
    let (new_element, partial) = if steps.len() == 1 {
        terminal(element)?
    } else {
        descend(element, &steps[1..], terminal)?
    };
    items[index] = new_element;

    Ok((Value::Object(map), partial))
}

fn find_element(items: &[Value], param: &str, value: &ParamValue) -> Option<usize> {
    items.iter().position(|item| {
        item.get(param)
            .map(|field| value.matches(field))
            .unwrap_or(false)
    })
}

fn mutate(original: Value, body: &Value, mode: UpdateMode) -> Result<Value> {
    let Value::Object(incoming) = body else {
        return Err(anyhow!(StoreError::BadShape(
            "body must be a JSON object".to_string()
        )));
    };
    match mode {
        UpdateMode::Replace => Ok(body.clone()),
        UpdateMode::Merge => {
            let Value::Object(mut target) = original else {
                return Err(anyhow!(StoreError::BadShape(
                    "target of a merge must be a JSON object".to_string()
                )));
            };
            for (key, val) in incoming {
                target.insert(key.clone(), val.clone());
            }
            Ok(Value::Object(target))
        }
    }
}
