use serde::{Deserialize, Serialize};

use crate::chain::Address;

/// Token amount in attoFIL.
pub type TokenAmount = u128;

/// A chain message as included in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub value: TokenAmount,
    pub method: u64,
    pub params: Vec<u8>,
    pub gas_limit: i64,
}

/// Receipt produced by executing a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub exit_code: i64,
    pub return_data: Vec<u8>,
    pub gas_used: i64,
}

impl MessageReceipt {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_json_shape() {
        let message = Message {
            from: Address::id(100),
            to: Address::id(200),
            nonce: 1,
            value: 1_000,
            method: 0,
            params: Vec::new(),
            gas_limit: 10_000,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["from"], "f0100");
        assert_eq!(json["nonce"], 1);
    }

    #[test]
    fn receipt_success_is_exit_code_zero() {
        let ok = MessageReceipt {
            exit_code: 0,
            return_data: vec![],
            gas_used: 10,
        };
        let failed = MessageReceipt {
            exit_code: 16,
            ..ok.clone()
        };
        assert!(ok.is_success());
        assert!(!failed.is_success());
    }
}
