//! Engine.IO v4 / Socket.IO v5 text frames
//!
//! Only the subset the relay uses over a WebSocket is understood:
//!
//! ```text
//! 0{...}              open (handshake parameters)
//! 1                   close
//! 2 / 3               ping / pong
//! 6                   noop
//! 40{auth}            connect to the default namespace
//! 41                  disconnect
//! 42[ack]["ev",data]  event, with optional ack id
//! 43<ack>[...]        ack
//! 44{...}             connect error
//! ```

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type: {0}")]
    UnknownType(String),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("frame json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        data: Value,
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        data: Vec<Value>,
    },
    ConnectError(Value),
}

impl Packet {
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Packet::Event {
            name: name.into(),
            data,
            ack: None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(params) => format!("0{}", params),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(auth)) => format!("40{}", auth),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, data, ack } => {
                let args = Value::Array(vec![Value::String(name.clone()), data.clone()]);
                match ack {
                    Some(id) => format!("42{}{}", id, args),
                    None => format!("42{}", args),
                }
            }
            Packet::Ack { id, data } => format!("43{}{}", id, Value::Array(data.clone())),
            Packet::ConnectError(err) => format!("44{}", err),
        }
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let engine = chars.next().ok_or(FrameError::Empty)?;
        let rest = chars.as_str();

        match engine {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            // probes carry a payload we do not care about
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '6' => Ok(Packet::Noop),
            '4' => Self::decode_socket(rest),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }

    fn decode_socket(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let body = strip_namespace(chars.as_str());

        match kind {
            '0' => {
                if body.is_empty() {
                    Ok(Packet::Connect(None))
                } else {
                    Ok(Packet::Connect(Some(serde_json::from_str(body)?)))
                }
            }
            '1' => Ok(Packet::Disconnect),
            '2' => {
                let (ack, args) = split_ack(body);
                let mut args = parse_args(args)?;
                if args.is_empty() {
                    return Err(FrameError::Malformed("event without a name".into()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(FrameError::Malformed(format!(
                            "event name is not a string: {}",
                            other
                        )))
                    }
                };
                let data = if args.is_empty() {
                    Value::Null
                } else {
                    args.remove(0)
                };
                Ok(Packet::Event { name, data, ack })
            }
            '3' => {
                let (ack, args) = split_ack(body);
                let id = ack.ok_or_else(|| FrameError::Malformed("ack without id".into()))?;
                Ok(Packet::Ack {
                    id,
                    data: parse_args(args)?,
                })
            }
            '4' => Ok(Packet::ConnectError(if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(body)?
            })),
            other => Err(FrameError::UnknownType(format!("4{}", other))),
        }
    }
}

/// `/ns,rest` -> `rest`; the default namespace has no prefix
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(i) => &body[i + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn split_ack(body: &str) -> (Option<u64>, &str) {
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return (None, body);
    }
    (body[..digits].parse().ok(), &body[digits..])
}

fn parse_args(args: &str) -> Result<Vec<Value>, FrameError> {
    match serde_json::from_str(args)? {
        Value::Array(values) => Ok(values),
        other => Err(FrameError::Malformed(format!(
            "expected an argument array, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_handshake_frames() {
        let open = Packet::decode(r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":20000}"#)
            .unwrap();
        assert_eq!(
            open,
            Packet::Open(json!({"sid": "abc", "pingInterval": 25000, "pingTimeout": 20000}))
        );
        assert_eq!(
            Packet::decode(r#"40{"sid":"x"}"#).unwrap(),
            Packet::Connect(Some(json!({"sid": "x"})))
        );
        assert_eq!(
            Packet::decode(r#"44{"message":"invalid token"}"#).unwrap(),
            Packet::ConnectError(json!({"message": "invalid token"}))
        );
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode("2probe").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode("41").unwrap(), Packet::Disconnect);
    }

    #[test]
    fn test_decode_events() {
        let update = Packet::decode(r#"42["update",{"body":{"t":"new-message"}}]"#).unwrap();
        assert_eq!(
            update,
            Packet::event("update", json!({"body": {"t": "new-message"}}))
        );

        let with_ack = Packet::decode(r#"4217["ping"]"#).unwrap();
        assert_eq!(
            with_ack,
            Packet::Event {
                name: "ping".into(),
                data: Value::Null,
                ack: Some(17)
            }
        );

        let namespaced = Packet::decode(r#"42/admin,["x",1]"#).unwrap();
        assert_eq!(namespaced, Packet::event("x", json!(1)));

        assert_eq!(
            Packet::decode(r#"433[{"ok":true}]"#).unwrap(),
            Packet::Ack {
                id: 3,
                data: vec![json!({"ok": true})]
            }
        );
    }

    #[test]
    fn test_encode_outbound_frames() {
        assert_eq!(Packet::Pong.encode(), "3");
        assert_eq!(
            Packet::Connect(Some(json!({"token": "t"}))).encode(),
            r#"40{"token":"t"}"#
        );
        assert_eq!(
            Packet::event("message", json!({"sid": "s"})).encode(),
            r#"42["message",{"sid":"s"}]"#
        );
        let acked = Packet::Event {
            name: "m".into(),
            data: json!(null),
            ack: Some(4),
        };
        assert_eq!(acked.encode(), r#"424["m",null]"#);
        assert_eq!(Packet::decode(&acked.encode()).unwrap(), acked);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Packet::decode(""), Err(FrameError::Empty)));
        assert!(matches!(Packet::decode("9"), Err(FrameError::UnknownType(_))));
        assert!(Packet::decode("42[]").is_err());
        assert!(Packet::decode("42[1,2]").is_err());
        assert!(Packet::decode(r#"42{"not":"array"}"#).is_err());
        assert!(Packet::decode("0not json").is_err());
    }
}
