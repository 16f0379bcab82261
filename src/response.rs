//! The AJAX response shared by every controller instance.
//!
//! A response is an ordered list of commands for the client-side library.
//! It is serialized as `{"commands": [{"cmd": "assign", ...}, ...]}`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

/// A client-side command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Assign {
        id: String,
        attribute: String,
        value: String,
    },
    Append {
        id: String,
        attribute: String,
        value: String,
    },
    Alert {
        message: String,
    },
    Script {
        code: String,
    },
    Redirect {
        url: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Response {
    commands: Vec<Command>,
}

/// Handle to the shared response.
pub type ResponseRef = Rc<RefCell<Response>>;

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an attribute of an element (`innerHTML`, `value`, ...).
    pub fn assign(&mut self, id: &str, attribute: &str, value: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Assign {
            id: id.to_string(),
            attribute: attribute.to_string(),
            value: value.into(),
        });
        self
    }

    /// Append to an attribute of an element.
    pub fn append(&mut self, id: &str, attribute: &str, value: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Append {
            id: id.to_string(),
            attribute: attribute.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn alert(&mut self, message: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Alert {
            message: message.into(),
        });
        self
    }

    pub fn script(&mut self, code: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Script { code: code.into() });
        self
    }

    pub fn redirect(&mut self, url: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Redirect { url: url.into() });
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A response wrapped for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpReply {
    /// JSON reply carrying the serialized response.
    pub fn json(response: &Response, status: u16) -> Self {
        match response.to_json() {
            Ok(body) => Self {
                status,
                content_type: "application/json; charset=utf-8",
                body,
            },
            Err(e) => Self {
                status: 500,
                content_type: "text/plain; charset=utf-8",
                body: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_commands_serialize_in_order() {
        let mut response = Response::new();
        response
            .assign("title", "innerHTML", "Users")
            .alert("saved")
            .redirect("/home");

        assert_eq!(
            response.to_json().unwrap(),
            r#"{"commands":[{"cmd":"assign","id":"title","attribute":"innerHTML","value":"Users"},{"cmd":"alert","message":"saved"},{"cmd":"redirect","url":"/home"}]}"#
        );
    }

    #[test]
    fn test_http_reply() {
        let mut response = Response::new();
        response.script("init()");
        let reply = HttpReply::json(&response, 200);
        assert_eq!(reply.status, 200);
        assert!(reply.content_type.starts_with("application/json"));
        assert_eq!(reply.body, r#"{"commands":[{"cmd":"script","code":"init()"}]}"#);
    }
}
