//! Topic naming
//!
//! ```text
//! {prefix}/{address}/{number}/state        value published by the bridge
//! {prefix}/{address}/{number}/set          command written by clients
//! {debug_prefix}/nasa/{kind}/{number}      decoded message tree (debug only)
//! ```
//!
//! `address` is the `cc.hh.aa` text form, `number` four lower-case hex
//! digits.

use crate::catalog;
use crate::codec::{
    Address, Command, DataType, Frame, MessageKind, MessageNumber, MessageSet,
};
use crate::config::MqttConfig;
use crate::error::CommandMappingError;

/// Builds and parses the bridge's MQTT topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    prefix: String,
    debug_prefix: String,
}

impl TopicScheme {
    pub fn new(prefix: impl Into<String>, debug_prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            debug_prefix: debug_prefix.into(),
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(config.topic_prefix.clone(), config.debug_prefix.clone())
    }

    pub fn state_topic(&self, address: Address, number: MessageNumber) -> String {
        format!("{}/{}/{}/state", self.prefix, address, number)
    }

    pub fn command_topic(&self, address: Address, number: MessageNumber) -> String {
        format!("{}/{}/{}/set", self.prefix, address, number)
    }

    /// Subscription filter matching every command topic
    pub fn command_filter(&self) -> String {
        format!("{}/+/+/set", self.prefix)
    }

    pub fn debug_topic(&self, number: MessageNumber) -> String {
        format!(
            "{}/nasa/{}/{}",
            self.debug_prefix,
            number.kind().debug_segment(),
            number
        )
    }

    /// Split a command topic into its device address and message number
    pub fn parse_command_topic(
        &self,
        topic: &str,
    ) -> Result<(Address, MessageNumber), CommandMappingError> {
        let unknown = || CommandMappingError::UnknownTopic(topic.to_string());

        let rest = topic
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .and_then(|r| r.strip_suffix("/set"))
            .ok_or_else(unknown)?;

        let (address, number) = rest.split_once('/').ok_or_else(unknown)?;
        let address: Address = address.parse().map_err(|_| unknown())?;
        let number = MessageNumber::from_hex(number).ok_or_else(unknown)?;

        if catalog::index_of(number).is_none() || number.kind() == MessageKind::Structure {
            return Err(unknown());
        }

        Ok((address, number))
    }

    /// Translate an inbound command into a Request frame for the bus
    ///
    /// The payload is a decimal integer that must fit the message's kind.
    /// The packet number is left at zero for the caller to assign.
    pub fn on_command(&self, topic: &str, payload: &[u8]) -> Result<Frame, CommandMappingError> {
        let (address, number) = self.parse_command_topic(topic)?;

        let malformed = |reason: String| CommandMappingError::MalformedPayload {
            topic: topic.to_string(),
            reason,
        };

        let text = std::str::from_utf8(payload)
            .map_err(|_| malformed("payload is not UTF-8".to_string()))?
            .trim();
        let value: i64 = text
            .parse()
            .map_err(|_| malformed(format!("'{}' is not an integer", text)))?;
        let set = MessageSet::new(number, value).ok_or_else(|| {
            let (min, max) = number.kind().value_range().unwrap_or((0, 0));
            malformed(format!("{} outside {}..={}", value, min, max))
        })?;

        Ok(Frame::new(
            Address::bridge(),
            address,
            Command::normal(DataType::Request, 0),
            vec![set],
        ))
    }
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::from_config(&MqttConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AddressClass, MessageValue};

    fn indoor() -> Address {
        Address::new(AddressClass::Indoor, 0x00, 0x00)
    }

    #[test]
    fn test_topic_names() {
        let scheme = TopicScheme::default();
        assert_eq!(
            scheme.state_topic(indoor(), MessageNumber(0x4203)),
            "samsung_ehs/20.00.00/4203/state"
        );
        assert_eq!(scheme.command_filter(), "samsung_ehs/+/+/set");
        assert_eq!(
            scheme.debug_topic(MessageNumber(0x8413)),
            "samsung_ehs_debug/nasa/var_long/8413"
        );
        assert_eq!(
            scheme.debug_topic(MessageNumber(0x4000)),
            "samsung_ehs_debug/nasa/enum/4000"
        );
    }

    #[test]
    fn test_on_command_builds_request() {
        let scheme = TopicScheme::default();
        let frame = scheme
            .on_command("samsung_ehs/20.00.00/4000/set", b"1")
            .unwrap();
        assert_eq!(frame.source, Address::bridge());
        assert_eq!(frame.destination, indoor());
        assert_eq!(frame.command.data_type, DataType::Request);
        assert_eq!(frame.messages[0].value, MessageValue::Enum(1));
    }

    #[test]
    fn test_on_command_signed_variable() {
        let scheme = TopicScheme::default();
        let frame = scheme
            .on_command("samsung_ehs/20.00.00/4201/set", b" -15\n")
            .unwrap();
        assert_eq!(frame.messages[0].value, MessageValue::Variable(-15));
    }

    #[test]
    fn test_unknown_topics() {
        let scheme = TopicScheme::default();
        for topic in [
            "other/20.00.00/4000/set",
            "samsung_ehs/20.00.00/4000/state",
            "samsung_ehs/20.00/4000/set",
            "samsung_ehs/20.00.00/zzzz/set",
            "samsung_ehs/20.00.00/40fe/set",
            "samsung_ehs/20.00.00/set",
            "samsung_ehs/+20.00.00/+4000/set",
            "samsung_ehs/20.00.00/+400/set",
        ] {
            assert!(
                matches!(
                    scheme.on_command(topic, b"1"),
                    Err(CommandMappingError::UnknownTopic(_))
                ),
                "{}",
                topic
            );
        }
    }

    #[test]
    fn test_malformed_payloads() {
        let scheme = TopicScheme::default();
        for payload in [&b"on"[..], b"", b"256", b"\xff"] {
            assert!(matches!(
                scheme.on_command("samsung_ehs/20.00.00/4000/set", payload),
                Err(CommandMappingError::MalformedPayload { .. })
            ));
        }
    }
}
