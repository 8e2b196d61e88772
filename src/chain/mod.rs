//! Read-only view of the chain.
//!
//! The service never constructs or signs transactions; the chain is an
//! oracle queried by transaction signature (payment verification) and by
//! derived account address (profile lookups).

mod profile;
mod rpc;

pub use profile::{
    AccountLookup, ProfileAdapter, ProfileSource, RegistryView, SkillRecord, WalletProfile,
    PROGRAM_ID, SKILL_TOKEN_MINT,
};
pub use rpc::{AccountInfo, ChainClient, RpcChainClient, TransactionInfo};
