//! XML-RPC codec: enough of the wire format to talk to
//! `/xmlrpc/2/common` and `/xmlrpc/2/object`.

use crate::error::RpcError;
use crate::value::Value;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

/// Serialize a `<methodCall>` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\"?>");
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Double(d) => {
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(map) => {
            out.push_str("<struct>");
            for (name, member) in map {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

/// Parse a `<methodResponse>` document. A `<fault>` surfaces as
/// [`RpcError::Fault`].
pub fn decode_response(xml: &str) -> Result<Value, RpcError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_fault = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"fault" => in_fault = true,
                b"value" => {
                    let value = parse_value(&mut reader)?;
                    if in_fault {
                        return Err(fault_from(&value));
                    }
                    return Ok(value);
                }
                _ => {}
            },
            Event::Eof => {
                return Err(RpcError::Decode("response contains no <value>".into()))
            }
            _ => {}
        }
    }
}

fn fault_from(value: &Value) -> RpcError {
    let code = value.get("faultCode").and_then(Value::as_i64).unwrap_or(0);
    let message = value
        .get("faultString")
        .and_then(Value::as_str)
        .unwrap_or("unknown fault")
        .trim()
        .to_string();
    RpcError::Fault { code, message }
}

/// Parse the content of a `<value>` whose start tag was just consumed.
fn parse_value(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut bare_text = String::new();
    let mut parsed: Option<Value> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                parsed = Some(match name.as_ref() {
                    b"string" | b"base64" | b"dateTime.iso8601" => {
                        Value::Str(read_scalar_text(reader, name.as_ref())?)
                    }
                    b"int" | b"i4" | b"i8" => {
                        let raw = read_scalar_text(reader, name.as_ref())?;
                        Value::Int(raw.trim().parse().map_err(|_| {
                            RpcError::Decode(format!("bad integer '{raw}'"))
                        })?)
                    }
                    b"double" => {
                        let raw = read_scalar_text(reader, name.as_ref())?;
                        Value::Double(raw.trim().parse().map_err(|_| {
                            RpcError::Decode(format!("bad double '{raw}'"))
                        })?)
                    }
                    b"boolean" => {
                        let raw = read_scalar_text(reader, name.as_ref())?;
                        Value::Bool(matches!(raw.trim(), "1" | "true"))
                    }
                    b"array" => parse_array(reader)?,
                    b"struct" => parse_struct(reader)?,
                    other => {
                        return Err(RpcError::Decode(format!(
                            "unexpected element <{}> inside <value>",
                            String::from_utf8_lossy(other)
                        )))
                    }
                });
            }
            Event::Empty(e) => {
                parsed = Some(match e.name().as_ref() {
                    b"nil" => Value::Nil,
                    b"string" | b"base64" => Value::Str(String::new()),
                    b"struct" => Value::Struct(BTreeMap::new()),
                    b"array" => Value::Array(Vec::new()),
                    _ => Value::Nil,
                });
            }
            Event::Text(t) => bare_text.push_str(&t.unescape()?),
            Event::End(e) if e.name().as_ref() == b"value" => {
                // XML-RPC defaults an untyped <value>text</value> to string.
                return Ok(parsed.unwrap_or(Value::Str(bare_text)));
            }
            Event::Eof => return Err(RpcError::Decode("unterminated <value>".into())),
            _ => {}
        }
    }
}

fn read_scalar_text(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<String, RpcError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::End(e) if e.name().as_ref() == tag => return Ok(text),
            Event::Eof => {
                return Err(RpcError::Decode(format!(
                    "unterminated <{}>",
                    String::from_utf8_lossy(tag)
                )))
            }
            _ => {}
        }
    }
}

fn parse_array(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut items = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"value" => {
                items.push(parse_value(reader)?);
            }
            Event::Empty(e) if e.name().as_ref() == b"value" => {
                items.push(Value::Str(String::new()));
            }
            Event::End(e) if e.name().as_ref() == b"array" => {
                return Ok(Value::Array(items))
            }
            Event::Eof => return Err(RpcError::Decode("unterminated <array>".into())),
            _ => {} // <data>
        }
    }
}

fn parse_struct(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut map = BTreeMap::new();
    let mut member_name: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"member" => member_name = None,
                b"name" => member_name = Some(read_scalar_text(reader, b"name")?),
                b"value" => {
                    let value = parse_value(reader)?;
                    map.insert(member_name.take().unwrap_or_default(), value);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"struct" => {
                return Ok(Value::Struct(map))
            }
            Event::Eof => return Err(RpcError::Decode("unterminated <struct>".into())),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_execute_kw_shaped_call() {
        let params = vec![
            Value::from("test"),
            Value::Int(2),
            Value::from("admin"),
            Value::from("product.brand"),
            Value::from("search"),
            Value::Array(vec![Value::Array(vec![Value::Array(vec![
                Value::from("name"),
                Value::from("="),
                Value::from("ACME & Co"),
            ])])]),
            Value::Struct(BTreeMap::new()),
        ];
        let xml = encode_call("execute_kw", &params);
        assert!(xml.starts_with("<?xml version=\"1.0\"?><methodCall>"));
        assert!(xml.contains("<methodName>execute_kw</methodName>"));
        assert!(xml.contains("<string>ACME &amp; Co</string>"));
        assert!(xml.contains("<struct></struct>"));
        assert!(xml.ends_with("</params></methodCall>"));
    }

    #[test]
    fn decodes_integer_response() {
        let xml = "<?xml version='1.0'?><methodResponse><params><param>\
                   <value><int>7</int></value></param></params></methodResponse>";
        assert_eq!(decode_response(xml).unwrap(), Value::Int(7));
    }

    #[test]
    fn decodes_untyped_string_value() {
        let xml = "<methodResponse><params><param><value>hello</value></param></params></methodResponse>";
        assert_eq!(decode_response(xml).unwrap(), Value::Str("hello".into()));
    }

    #[test]
    fn decodes_search_read_shape() {
        let xml = "<methodResponse><params><param><value><array><data>\
                   <value><struct>\
                   <member><name>id</name><value><int>5</int></value></member>\
                   <member><name>name</name><value><string>IVA 21%</string></value></member>\
                   <member><name>parent_id</name><value><boolean>0</boolean></value></member>\
                   </struct></value>\
                   </data></array></value></param></params></methodResponse>";
        let value = decode_response(xml).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id").and_then(Value::as_i64), Some(5));
        assert_eq!(rows[0].get("name").and_then(Value::as_str), Some("IVA 21%"));
        assert_eq!(rows[0].get("parent_id").and_then(Value::as_bool), Some(false));
    }

    #[test]
    fn decodes_fault_as_error() {
        let xml = "<methodResponse><fault><value><struct>\
                   <member><name>faultCode</name><value><int>1</int></value></member>\
                   <member><name>faultString</name><value><string>Access Denied</string></value></member>\
                   </struct></value></fault></methodResponse>";
        match decode_response(xml) {
            Err(RpcError::Fault { code, message }) => {
                assert_eq!(code, 1);
                assert_eq!(message, "Access Denied");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn escaped_text_round_trips() {
        let xml = "<methodResponse><params><param>\
                   <value><string>a &lt; b &amp;&amp; c &gt; d</string></value>\
                   </param></params></methodResponse>";
        assert_eq!(
            decode_response(xml).unwrap(),
            Value::Str("a < b && c > d".into())
        );
    }

    #[test]
    fn decodes_self_closing_composites() {
        let xml = "<methodResponse><params><param><value><array><data>\
                   <value><struct/></value><value><array/></value>\
                   </data></array></value></param></params></methodResponse>";
        assert_eq!(
            decode_response(xml).unwrap(),
            Value::Array(vec![Value::Struct(BTreeMap::new()), Value::Array(Vec::new())])
        );
    }

    #[test]
    fn decodes_nil_and_double() {
        let xml = "<methodResponse><params><param><value><array><data>\
                   <value><nil/></value><value><double>1234.5</double></value>\
                   </data></array></value></param></params></methodResponse>";
        assert_eq!(
            decode_response(xml).unwrap(),
            Value::Array(vec![Value::Nil, Value::Double(1234.5)])
        );
    }
}
