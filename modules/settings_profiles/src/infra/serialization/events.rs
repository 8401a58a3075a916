//! Conversions between `serde_yaml::Value` trees and parse event sequences

use crate::contract::{ParsingEvent, RawEvents, ScalarValue};
use anyhow::{anyhow, bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Number, Value};

/// Flatten a value tree into its event sequence
pub fn value_to_events(value: &Value) -> RawEvents {
    let mut events = Vec::new();
    push_value(value, None, &mut events);
    events
}

/// Rebuild a value tree from exactly one node's worth of events
pub fn events_to_value(events: &[ParsingEvent]) -> Result<Value> {
    let mut iter = events.iter();
    let value = read_value(&mut iter)?;
    if iter.next().is_some() {
        bail!("trailing events after the end of the value");
    }
    Ok(value)
}

/// Serialize a typed value into events
pub fn to_events<T: Serialize>(value: &T) -> Result<RawEvents> {
    let tree = serde_yaml::to_value(value)?;
    Ok(value_to_events(&tree))
}

/// Deserialize a typed value from events
pub fn from_events<T: DeserializeOwned>(events: &[ParsingEvent]) -> Result<T> {
    let tree = events_to_value(events)?;
    Ok(serde_yaml::from_value(tree)?)
}

fn push_value(value: &Value, tag: Option<String>, out: &mut RawEvents) {
    match value {
        Value::Null => out.push(ParsingEvent::Scalar {
            value: ScalarValue::Null,
            tag,
        }),
        Value::Bool(b) => out.push(ParsingEvent::Scalar {
            value: ScalarValue::Bool(*b),
            tag,
        }),
        Value::Number(n) => out.push(ParsingEvent::Scalar {
            value: number_to_scalar(n),
            tag,
        }),
        Value::String(s) => out.push(ParsingEvent::Scalar {
            value: ScalarValue::String(s.clone()),
            tag,
        }),
        Value::Sequence(items) => {
            out.push(ParsingEvent::SequenceStart { tag });
            for item in items {
                push_value(item, None, out);
            }
            out.push(ParsingEvent::SequenceEnd);
        }
        Value::Mapping(map) => {
            out.push(ParsingEvent::MappingStart { tag });
            for (k, v) in map {
                push_value(k, None, out);
                push_value(v, None, out);
            }
            out.push(ParsingEvent::MappingEnd);
        }
        Value::Tagged(tagged) => push_value(&tagged.value, Some(tag_name(&tagged.tag)), out),
    }
}

fn read_value<'a, I>(iter: &mut I) -> Result<Value>
where
    I: Iterator<Item = &'a ParsingEvent>,
{
    let event = iter
        .next()
        .ok_or_else(|| anyhow!("unexpected end of event stream"))?;
    read_node(event, iter)
}

fn read_node<'a, I>(event: &'a ParsingEvent, iter: &mut I) -> Result<Value>
where
    I: Iterator<Item = &'a ParsingEvent>,
{
    let (value, tag) = match event {
        ParsingEvent::Scalar { value, tag } => (scalar_to_value(value), tag),
        ParsingEvent::SequenceStart { tag } => {
            let mut items = Vec::new();
            loop {
                let next = iter
                    .next()
                    .ok_or_else(|| anyhow!("unterminated sequence"))?;
                if matches!(next, ParsingEvent::SequenceEnd) {
                    break;
                }
                items.push(read_node(next, iter)?);
            }
            (Value::Sequence(items), tag)
        }
        ParsingEvent::MappingStart { tag } => {
            let mut map = Mapping::new();
            loop {
                let next = iter
                    .next()
                    .ok_or_else(|| anyhow!("unterminated mapping"))?;
                if matches!(next, ParsingEvent::MappingEnd) {
                    break;
                }
                let key = read_node(next, iter)?;
                let value = read_value(iter)?;
                map.insert(key, value);
            }
            (Value::Mapping(map), tag)
        }
        ParsingEvent::SequenceEnd | ParsingEvent::MappingEnd => {
            bail!("unexpected end marker {:?}", event)
        }
    };

    Ok(match tag {
        Some(tag) if !tag.is_empty() => Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(tag.as_str()),
            value,
        })),
        _ => value,
    })
}

fn number_to_scalar(n: &Number) -> ScalarValue {
    if let Some(i) = n.as_i64() {
        ScalarValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        ScalarValue::UInt(u)
    } else {
        n.as_f64().map_or(ScalarValue::Null, ScalarValue::Float)
    }
}

fn scalar_to_value(scalar: &ScalarValue) -> Value {
    match scalar {
        ScalarValue::Null => Value::Null,
        ScalarValue::Bool(b) => Value::Bool(*b),
        ScalarValue::Int(i) => Value::Number(Number::from(*i)),
        ScalarValue::UInt(u) => Value::Number(Number::from(*u)),
        ScalarValue::Float(f) => Value::Number(Number::from(*f)),
        ScalarValue::String(s) => Value::String(s.clone()),
    }
}

/// Tag text without the leading `!`
pub(crate) fn tag_name(tag: &Tag) -> String {
    let text = tag.to_string();
    text.strip_prefix('!').map(str::to_string).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_scalar_events() {
        let events = to_events(&42_i32).unwrap();
        assert_eq!(events, vec![ParsingEvent::scalar(42_i64)]);
        assert_eq!(from_events::<i32>(&events).unwrap(), 42);
    }

    #[test]
    fn test_sequence_events() {
        let events = to_events(&vec!["a", "b"]).unwrap();
        assert_eq!(
            events,
            vec![
                ParsingEvent::sequence_start(),
                ParsingEvent::scalar("a"),
                ParsingEvent::scalar("b"),
                ParsingEvent::SequenceEnd,
            ]
        );
    }

    #[test]
    fn test_nested_mapping_survives_conversion() {
        let mut value: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        value.insert("left".to_string(), vec![1.5, 2.0]);
        value.insert("right".to_string(), vec![]);

        let events = to_events(&value).unwrap();
        assert!(matches!(events.first(), Some(ParsingEvent::MappingStart { .. })));
        let back: BTreeMap<String, Vec<f64>> = from_events(&events).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_tags_are_preserved() {
        let tree: Value = serde_yaml::from_str("!Color { r: 1, g: 2 }").unwrap();
        let events = value_to_events(&tree);
        assert_eq!(
            events.first(),
            Some(&ParsingEvent::MappingStart {
                tag: Some("Color".to_string())
            })
        );
        assert_eq!(events_to_value(&events).unwrap(), tree);
    }

    #[test]
    fn test_malformed_streams_are_rejected() {
        assert!(events_to_value(&[]).is_err());
        assert!(events_to_value(&[ParsingEvent::sequence_start()]).is_err());
        assert!(events_to_value(&[ParsingEvent::MappingEnd]).is_err());
        assert!(events_to_value(&[ParsingEvent::scalar(1_i64), ParsingEvent::scalar(2_i64)]).is_err());
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let events = to_events(&"not a number").unwrap();
        assert!(from_events::<u32>(&events).is_err());
    }
}
