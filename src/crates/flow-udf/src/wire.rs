//! Wire messages for the UDF protocol (spec §4.11). Hand-written
//! `prost::Message` structs rather than `protoc`/`tonic-build` codegen —
//! there's no `.proto` source to generate from here, just the message
//! shapes the protocol needs, framed by hand over a subprocess's stdio
//! pipes (see `framing.rs`), not a gRPC service.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct OptionValue {
    #[prost(bool, optional, tag = "1")]
    pub bool_value: Option<bool>,
    #[prost(int64, optional, tag = "2")]
    pub int_value: Option<i64>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(string, optional, tag = "4")]
    pub string_value: Option<String>,
    /// Nanoseconds.
    #[prost(int64, optional, tag = "5")]
    pub duration_value: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OptionEntry {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub values: Vec<OptionValue>,
}

#[derive(Clone, Copy, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum EdgeType {
    Stream = 0,
    Batch = 1,
}

/// core -> udf: declared options and the edge type the UDF will run on.
#[derive(Clone, PartialEq, Message)]
pub struct Init {
    #[prost(message, repeated, tag = "1")]
    pub options: Vec<OptionEntry>,
    #[prost(enumeration = "EdgeType", tag = "2")]
    pub edge_type: i32,
}

/// udf -> core. `edge_type` is the UDF's own declared edge type, checked
/// against the `Init` the core sent (spec §4.11 "UDF init negotiation") —
/// a UDF that mis-declares itself (e.g. written for batch, placed on a
/// stream task) must fail negotiation rather than silently run.
#[derive(Clone, PartialEq, Message)]
pub struct InitResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub error: String,
    #[prost(enumeration = "EdgeType", tag = "3")]
    pub edge_type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct FieldValue {
    #[prost(double, optional, tag = "1")]
    pub float_value: Option<f64>,
    #[prost(int64, optional, tag = "2")]
    pub int_value: Option<i64>,
    #[prost(bool, optional, tag = "3")]
    pub bool_value: Option<bool>,
    #[prost(string, optional, tag = "4")]
    pub string_value: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Tag {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Field {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<FieldValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WirePoint {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub time: i64,
    #[prost(uint64, tag = "3")]
    pub group: u64,
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<Tag>,
    #[prost(message, repeated, tag = "5")]
    pub fields: Vec<Field>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireBatch {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub tmax: i64,
    #[prost(message, repeated, tag = "3")]
    pub tags: Vec<Tag>,
    #[prost(message, repeated, tag = "4")]
    pub points: Vec<WirePoint>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Keepalive {
    #[prost(int64, tag = "1")]
    pub time: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Abort {
    #[prost(string, tag = "1")]
    pub error: String,
}

impl From<&flow_core::Point> for WirePoint {
    fn from(p: &flow_core::Point) -> Self {
        WirePoint {
            name: p.measurement.clone(),
            time: p.time,
            group: p.group_id.0,
            tags: p.tags.iter().map(|(k, v)| Tag { key: k.clone(), value: v.clone() }).collect(),
            fields: p
                .fields
                .iter()
                .map(|(k, v)| Field {
                    key: k.clone(),
                    value: Some(field_value_from(v)),
                })
                .collect(),
        }
    }
}

fn field_value_from(v: &flow_core::Value) -> FieldValue {
    match v {
        flow_core::Value::Float(f) => FieldValue { float_value: Some(*f), ..Default::default() },
        flow_core::Value::Int(i) => FieldValue { int_value: Some(*i), ..Default::default() },
        flow_core::Value::Bool(b) => FieldValue { bool_value: Some(*b), ..Default::default() },
        flow_core::Value::Str(s) => FieldValue { string_value: Some(s.clone()), ..Default::default() },
        flow_core::Value::Duration(d) => FieldValue { int_value: Some(*d), ..Default::default() },
        flow_core::Value::Null => FieldValue::default(),
    }
}

impl From<&WirePoint> for flow_core::Point {
    fn from(w: &WirePoint) -> Self {
        let mut tags = flow_core::Tags::new();
        for t in &w.tags {
            tags.insert(t.key.clone(), t.value.clone());
        }
        let mut p = flow_core::Point::new(w.name.clone(), w.time).with_tags(tags);
        for f in &w.fields {
            if let Some(v) = &f.value {
                let value = if let Some(fl) = v.float_value {
                    flow_core::Value::Float(fl)
                } else if let Some(i) = v.int_value {
                    flow_core::Value::Int(i)
                } else if let Some(b) = v.bool_value {
                    flow_core::Value::Bool(b)
                } else if let Some(s) = &v.string_value {
                    flow_core::Value::Str(s.clone())
                } else {
                    flow_core::Value::Null
                };
                p = p.with_field(f.key.clone(), value);
            }
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::{Point, Tags};

    #[test]
    fn point_roundtrips_through_wire_shape() {
        let p = Point::new("cpu", 10).with_tags(Tags::from_pairs([("host", "a")])).with_field("value", 1.5);
        let wire = WirePoint::from(&p);
        let back = flow_core::Point::from(&wire);
        assert_eq!(back.measurement, "cpu");
        assert_eq!(back.tag("host"), Some("a"));
        assert_eq!(back.field("value").and_then(flow_core::Value::as_f64), Some(1.5));
    }

    #[test]
    fn init_encodes_and_decodes() {
        let init = Init {
            options: vec![OptionEntry {
                name: "field".to_string(),
                values: vec![OptionValue { string_value: Some("value".to_string()), ..Default::default() }],
            }],
            edge_type: EdgeType::Stream as i32,
        };
        let mut buf = Vec::new();
        init.encode(&mut buf).unwrap();
        let decoded = Init::decode(buf.as_slice()).unwrap();
        assert_eq!(decoded.options.len(), 1);
        assert_eq!(decoded.edge_type, EdgeType::Stream as i32);
    }
}
