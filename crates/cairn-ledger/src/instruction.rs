//! Instructions and client transactions
//!
//! An [`Instruction`] is one spawn/invoke/delete operation against a
//! target instance; a [`ClientTransaction`] is the ordered, non-empty
//! sequence submitted as a single atomic unit. Instructions execute in
//! sequence order at the ledger and the whole set is rejected if any one
//! of them fails its authorization check or precondition — no partial
//! effects are ever visible.

use crate::errors::{LedgerError, Result};
use cairn_core::hash;
use cairn_core::{DarcId, IdentitySignature};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known contract type names
pub mod contracts {
    /// Access-control documents
    pub const DARC: &str = "darc";
    /// Fungible coin accounts
    pub const COIN: &str = "coin";
    /// User credential objects
    pub const CREDENTIAL: &str = "credential";
    /// Re-encryption write objects
    pub const SECRET_WRITE: &str = "secret-write";
    /// Re-encryption read requests
    pub const SECRET_READ: &str = "secret-read";
}

/// Well-known invoke command names
pub mod commands {
    /// Evolve a darc to its next version
    pub const EVOLVE: &str = "evolve";
    /// Recovery evolution bypassing the ordinary evolve rule
    pub const EVOLVE_UNRESTRICTED: &str = "evolve_unrestricted";
    /// Draw coins out of a coin account
    pub const FETCH: &str = "fetch";
    /// Move coins between accounts
    pub const TRANSFER: &str = "transfer";
}

/// 32-byte identifier of a ledger object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId([u8; 32]);

impl InstanceId {
    /// Wrap raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Deterministically derive an instance id from a tag and a seed
    ///
    /// This is how object ids are known before submission: a coin spawned
    /// with seed `s` will live at `derived("coin", s)` once the
    /// transaction commits.
    pub fn derived(tag: &str, seed: &[u8]) -> Self {
        let mut h = hash::hasher();
        h.update(tag.as_bytes());
        h.update(&[0]);
        h.update(seed);
        Self(*h.finalize().as_bytes())
    }
}

impl From<DarcId> for InstanceId {
    fn from(id: DarcId) -> Self {
        // Darc instances live at their base id.
        Self(*id.as_bytes())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// One named byte-valued argument of an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument name, defined by the target contract
    pub name: String,
    /// Raw argument payload
    pub value: Vec<u8>,
}

impl Argument {
    /// Create a named argument
    pub fn new(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The operation an instruction performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Create a new object of `contract` type
    Spawn {
        /// Contract type of the new object
        contract: String,
        /// Spawn arguments, in order
        args: Vec<Argument>,
    },
    /// Call `command` on an existing object
    Invoke {
        /// Contract type of the target
        contract: String,
        /// Command name
        command: String,
        /// Invoke arguments, in order
        args: Vec<Argument>,
    },
    /// Remove an object
    Delete {
        /// Contract type of the target
        contract: String,
    },
}

/// One operation within a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The instance this instruction acts on
    pub target: InstanceId,
    /// What to do there
    pub kind: InstructionKind,
    /// Signatures authorizing this instruction; empty until signing
    pub signatures: Vec<IdentitySignature>,
}

impl Instruction {
    /// A spawn instruction targeting the darc (or spawner) at `target`
    pub fn spawn(target: InstanceId, contract: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            target,
            kind: InstructionKind::Spawn {
                contract: contract.into(),
                args,
            },
            signatures: Vec::new(),
        }
    }

    /// An invoke instruction against an existing object
    pub fn invoke(
        target: InstanceId,
        contract: impl Into<String>,
        command: impl Into<String>,
        args: Vec<Argument>,
    ) -> Self {
        Self {
            target,
            kind: InstructionKind::Invoke {
                contract: contract.into(),
                command: command.into(),
                args,
            },
            signatures: Vec::new(),
        }
    }

    /// A delete instruction removing an existing object
    pub fn delete(target: InstanceId, contract: impl Into<String>) -> Self {
        Self {
            target,
            kind: InstructionKind::Delete {
                contract: contract.into(),
            },
            signatures: Vec::new(),
        }
    }

    /// Content digest of this instruction, excluding signatures
    pub fn digest(&self) -> [u8; 32] {
        let mut h = hash::hasher();
        h.update(b"instruction");
        h.update(self.target.as_bytes());
        match &self.kind {
            InstructionKind::Spawn { contract, args } => {
                h.update(&[0]);
                h.update(contract.as_bytes());
                hash_args(&mut h, args);
            }
            InstructionKind::Invoke {
                contract,
                command,
                args,
            } => {
                h.update(&[1]);
                h.update(contract.as_bytes());
                h.update(&[b'.']);
                h.update(command.as_bytes());
                hash_args(&mut h, args);
            }
            InstructionKind::Delete { contract } => {
                h.update(&[2]);
                h.update(contract.as_bytes());
            }
        }
        *h.finalize().as_bytes()
    }

    /// The contract type this instruction addresses
    pub fn contract(&self) -> &str {
        match &self.kind {
            InstructionKind::Spawn { contract, .. }
            | InstructionKind::Invoke { contract, .. }
            | InstructionKind::Delete { contract } => contract,
        }
    }

    /// Look up an argument by name
    pub fn arg(&self, name: &str) -> Option<&[u8]> {
        let args = match &self.kind {
            InstructionKind::Spawn { args, .. } | InstructionKind::Invoke { args, .. } => args,
            InstructionKind::Delete { .. } => return None,
        };
        args.iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_slice())
    }
}

fn hash_args(h: &mut blake3::Hasher, args: &[Argument]) {
    for arg in args {
        h.update(&(arg.name.len() as u64).to_le_bytes());
        h.update(arg.name.as_bytes());
        h.update(&(arg.value.len() as u64).to_le_bytes());
        h.update(&arg.value);
    }
}

/// An ordered, non-empty instruction sequence submitted atomically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTransaction {
    instructions: Vec<Instruction>,
}

impl ClientTransaction {
    /// Wrap an instruction sequence; empty sequences are rejected
    pub fn new(instructions: Vec<Instruction>) -> Result<Self> {
        if instructions.is_empty() {
            return Err(LedgerError::construction(
                "a transaction must contain at least one instruction",
            ));
        }
        Ok(Self { instructions })
    }

    /// The instructions, in execution order
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Hash of the whole transaction, over instruction digests
    pub fn hash(&self) -> [u8; 32] {
        let mut h = hash::hasher();
        h.update(b"transaction");
        for instruction in &self.instructions {
            h.update(&instruction.digest());
        }
        *h.finalize().as_bytes()
    }

    /// The message signers of instruction `index` commit to
    ///
    /// Binds the instruction to its position inside this transaction, so
    /// a signature cannot be replayed for the same instruction in a
    /// different atomic set.
    pub fn signing_message(&self, index: usize) -> [u8; 32] {
        let mut h = hash::hasher();
        h.update(b"instruction-signature");
        h.update(&self.hash());
        h.update(&(index as u64).to_le_bytes());
        h.update(&self.instructions[index].digest());
        *h.finalize().as_bytes()
    }

    /// Attach `signature` to instruction `index`
    pub fn add_signature(&mut self, index: usize, signature: IdentitySignature) {
        self.instructions[index].signatures.push(signature);
    }
}
