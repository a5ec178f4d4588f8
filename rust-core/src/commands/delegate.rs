// Delegate registration and the chain-wide username registry.

use super::{Command, CommandContext, CommandResult};
use crate::account::DelegateInfo;
use crate::codec::{CodecError, Reader, Writer};
use crate::error::{FatalError, TransactionError};
use crate::state::{CacheFilter, StateStore};
use crate::types::{to_hex, Address};
use tracing::debug;

/// Chain-state key holding every registered `(username, address)` pair.
pub const DELEGATE_USERNAMES_KEY: &str = "dpos:delegateUsernames";

const USERNAME_CHARSET: &str = "abcdefghijklmnopqrstuvwxyz0123456789!@$&_.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateRegistration {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDelegate {
    pub username: String,
    pub address: Address,
}

fn contains_null(value: &str) -> bool {
    const ESCAPED: [&str; 4] = ["\\0", "\\x00", "\\u0000", "\\U00000000"];
    value.contains('\0') || ESCAPED.iter().any(|p| value.contains(p))
}

/// Looks like a legacy numeric address, e.g. `12345L`.
fn looks_like_legacy_address(value: &str) -> bool {
    let Some(digits) = value.strip_suffix(['L', 'l']) else {
        return false;
    };
    (1..=21).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Returns the reason the username is unacceptable, if any.
pub fn check_username(username: &str, max_length: usize) -> Option<&'static str> {
    if username.is_empty() || username.len() > max_length {
        return Some("Username length does not match requirements.");
    }
    if contains_null(username) {
        return Some("Username must not contain null characters.");
    }
    if username != username.trim().to_lowercase() {
        return Some("Username must be lowercase without surrounding whitespace.");
    }
    if looks_like_legacy_address(username) {
        return Some("Username can not be a potential address.");
    }
    if !username.chars().all(|c| USERNAME_CHARSET.contains(c)) {
        return Some("Username contains unsupported characters.");
    }
    None
}

fn encode_registry(entries: &[RegisteredDelegate]) -> Vec<u8> {
    let mut w = Writer::new();
    for entry in entries {
        let item = Writer::new()
            .write_str(1, &entry.username)
            .write_bytes(2, &entry.address)
            .finish();
        w.write_object(1, &item);
    }
    w.finish()
}

fn decode_registry(bytes: &[u8]) -> Result<Vec<RegisteredDelegate>, CodecError> {
    let mut r = Reader::new(bytes);
    let items = r.read_repeated_bytes(1)?;
    r.finish()?;
    items
        .into_iter()
        .map(|item| {
            let mut ir = Reader::new(item);
            let username = ir.read_str(1)?;
            let address = ir.read_fixed::<20>(2)?;
            ir.finish()?;
            Ok(RegisteredDelegate { username, address })
        })
        .collect()
}

/// All registered delegates, sorted by address.
pub fn registry(store: &dyn StateStore) -> Result<Vec<RegisteredDelegate>, FatalError> {
    match store.chain_get(DELEGATE_USERNAMES_KEY) {
        Some(bytes) => {
            decode_registry(&bytes).map_err(|e| FatalError::CorruptRegistry(e.to_string()))
        }
        None => Ok(Vec::new()),
    }
}

pub fn registry_insert(
    store: &mut dyn StateStore,
    address: Address,
    username: &str,
) -> Result<(), FatalError> {
    let mut entries = registry(store)?;
    entries.retain(|e| e.address != address);
    entries.push(RegisteredDelegate {
        username: username.to_string(),
        address,
    });
    entries.sort_by(|a, b| a.address.cmp(&b.address));
    store.chain_set(DELEGATE_USERNAMES_KEY, encode_registry(&entries));
    Ok(())
}

pub fn registry_remove(store: &mut dyn StateStore, address: &Address) -> Result<(), FatalError> {
    let mut entries = registry(store)?;
    let before = entries.len();
    entries.retain(|e| &e.address != address);
    if entries.len() == before {
        return Err(FatalError::MissingDelegate(to_hex(address)));
    }
    store.chain_set(DELEGATE_USERNAMES_KEY, encode_registry(&entries));
    Ok(())
}

impl Command for DelegateRegistration {
    const TYPE: u32 = 10;

    fn encode(&self) -> Vec<u8> {
        Writer::new().write_str(1, &self.username).finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let username = r.read_str(1)?;
        r.finish()?;
        Ok(Self { username })
    }

    fn name_fee(&self, config: &crate::config::ProtocolConfig) -> u64 {
        config.delegate_registration_fee
    }

    fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError> {
        match check_username(&self.username, ctx.config.max_username_length) {
            Some(reason) => vec![TransactionError::schema(ctx.id, "/params/username", reason)
                .with_values(&self.username, "valid username")],
            None => Vec::new(),
        }
    }

    fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let mut errors = Vec::new();
        let taken_in_registry = registry(store)?.iter().any(|e| e.username == self.username);
        let taken_by_account = store
            .find_account(&|a| a.username() == Some(self.username.as_str()))
            .is_some();
        if taken_in_registry || taken_by_account {
            errors.push(
                TransactionError::asset(ctx.id, "/params/username", "Username is not unique.")
                    .with_values(&self.username, "unique username"),
            );
        }

        let mut sender = store.account(&ctx.sender_address)?;
        if sender.is_delegate() {
            errors.push(TransactionError::asset(
                ctx.id,
                "/params/username",
                "Account is already a delegate.",
            ));
        }
        if !errors.is_empty() {
            return Ok(errors);
        }

        let height = store.chain_context().current_height();
        sender.delegate = Some(DelegateInfo::new(self.username.clone(), height));
        store.set_account(sender);
        registry_insert(store, ctx.sender_address, &self.username)?;
        debug!(
            delegate = %to_hex(&ctx.sender_address),
            username = %self.username,
            height,
            "delegate registered"
        );
        Ok(errors)
    }

    fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let mut sender = store.account(&ctx.sender_address)?;
        if sender.delegate.take().is_none() {
            return Err(FatalError::MissingDelegate(to_hex(&ctx.sender_address)));
        }
        store.set_account(sender);
        registry_remove(store, &ctx.sender_address)?;
        Ok(Vec::new())
    }

    fn cache_filters(&self) -> Vec<CacheFilter> {
        vec![CacheFilter::Username(self.username.clone())]
    }
}
