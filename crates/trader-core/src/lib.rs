pub mod api;
pub mod app;
pub mod config;
pub mod contracts;
pub mod deposit;
pub mod error;
pub mod follow;
pub mod key_wallet;
pub mod notify;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod store;

use alloy_primitives::Address;
use chain_eth::address::short_address;

pub use app::TraderApp;
pub use error::TraderError;
pub use session::{ConnectionState, SessionSignal, WalletSession};

// ─── Presentation helpers ────────────────────────────────────────────

/// Text of the connect button for the given connected address.
pub fn connect_button_label(address: Option<&Address>) -> String {
    match address {
        Some(address) => format!("Connected: {}", short_address(address)),
        None => "Connect Wallet".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_eth::address::parse_address;

    #[test]
    fn connect_button_label_states() {
        assert_eq!(connect_button_label(None), "Connect Wallet");
        let address = parse_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
        assert_eq!(connect_button_label(Some(&address)), "Connected: 0xf39F...2266");
    }
}
