//! Accumulating transaction builder
//!
//! A [`TransactionBuilder`] collects instructions one call at a time and
//! submits them as a single atomic unit. Accumulation is pure and
//! infallible; only [`send`](TransactionBuilder::send) can fail. `send`
//! takes the builder by value: a submitted transaction is consumed, and
//! the type system — rather than a runtime flag — rejects any further
//! mutation. A fresh attempt starts from
//! [`clone_fresh`](TransactionBuilder::clone_fresh), which shares only
//! the immutable ledger handle.
//!
//! Builders are not synchronized: a builder instance belongs to one call
//! site, and concurrent construction uses independent instances.

use crate::client::{LedgerClient, TransactionAck};
use crate::errors::{LedgerError, Result};
use crate::instruction::{Argument, ClientTransaction, InstanceId, Instruction};
use cairn_core::KeyPair;
use std::sync::Arc;
use tracing::debug;

/// Accumulates instructions and submits them atomically
pub struct TransactionBuilder {
    client: Arc<dyn LedgerClient>,
    instructions: Vec<Instruction>,
}

impl TransactionBuilder {
    /// A builder bound to `client` with no instructions yet
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            instructions: Vec::new(),
        }
    }

    /// An independent empty builder sharing only the ledger handle
    pub fn clone_fresh(&self) -> Self {
        Self::new(self.client.clone())
    }

    /// The ledger handle this builder submits through
    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    /// Append a spawn instruction targeting the darc or spawner at `target`
    pub fn spawn(&mut self, target: InstanceId, contract: &str, args: Vec<Argument>) {
        self.instructions
            .push(Instruction::spawn(target, contract, args));
    }

    /// Append an invoke instruction against an existing object
    pub fn invoke(&mut self, target: InstanceId, contract: &str, command: &str, args: Vec<Argument>) {
        self.instructions
            .push(Instruction::invoke(target, contract, command, args));
    }

    /// Append a delete instruction
    pub fn delete(&mut self, target: InstanceId, contract: &str) {
        self.instructions.push(Instruction::delete(target, contract));
    }

    /// Insert `instruction` at the front of the sequence
    ///
    /// Instructions execute in order, so a fee-settlement fetch prepended
    /// here makes its funds available to every later instruction of the
    /// same atomic unit.
    pub fn unshift(&mut self, instruction: Instruction) {
        self.instructions.insert(0, instruction);
    }

    /// The accumulated instructions, in execution order
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// True when nothing has been accumulated yet
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Sign every instruction and submit the sequence atomically
    ///
    /// `signer_sets` is either a single set applied to every instruction,
    /// or exactly one set per instruction. Waits up to `wait_blocks`
    /// ledger rounds for inclusion; `0` returns after acknowledgment.
    /// Returns the signed transaction together with the ledger's
    /// acknowledgment. Failure is reported, never retried.
    pub async fn send(
        self,
        signer_sets: &[Vec<KeyPair>],
        wait_blocks: u32,
    ) -> Result<(ClientTransaction, TransactionAck)> {
        let mut tx = ClientTransaction::new(self.instructions)?;
        let count = tx.instructions().len();

        if signer_sets.is_empty() {
            return Err(LedgerError::construction("no signer set supplied"));
        }
        if signer_sets.len() != 1 && signer_sets.len() != count {
            return Err(LedgerError::construction(format!(
                "{} signer sets for {} instructions (want 1 or {})",
                signer_sets.len(),
                count,
                count
            )));
        }

        for index in 0..count {
            let set = if signer_sets.len() == 1 {
                &signer_sets[0]
            } else {
                &signer_sets[index]
            };
            let message = tx.signing_message(index);
            for signer in set {
                let signature = signer.sign(&message);
                tx.add_signature(index, signature);
            }
        }

        debug!(
            instructions = count,
            wait_blocks,
            tx = %hex::encode(tx.hash()),
            "submitting transaction"
        );
        let ack = self.client.submit(tx.clone(), wait_blocks).await?;
        Ok((tx, ack))
    }
}

impl std::fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("instructions", &self.instructions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::contracts;
    use crate::spawner::FeeSchedule;
    use crate::testing::StubLedger;
    use cairn_core::{Darc, KeyPair};

    fn stub() -> Arc<StubLedger> {
        Arc::new(StubLedger::new(FeeSchedule::default()))
    }

    #[tokio::test]
    async fn send_with_no_instructions_fails() {
        let builder = TransactionBuilder::new(stub());
        let err = builder.send(&[vec![KeyPair::random()]], 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Construction { .. }));
    }

    #[tokio::test]
    async fn mismatched_signer_sets_fail() {
        let ledger = stub();
        let signer = KeyPair::from_seed([1; 32]);
        let darc = Darc::basic(&[signer.identity()], &[signer.identity()], "a");
        ledger.register_darc(&darc);

        let mut builder = TransactionBuilder::new(ledger);
        builder.invoke(darc.base_id().into(), contracts::DARC, "noop", vec![]);
        builder.invoke(darc.base_id().into(), contracts::DARC, "noop", vec![]);
        builder.invoke(darc.base_id().into(), contracts::DARC, "noop", vec![]);

        let sets = vec![vec![signer.clone()], vec![signer.clone()]];
        let err = builder.send(&sets, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Construction { .. }));
    }

    #[test]
    fn unshift_puts_instruction_first() {
        let mut builder = TransactionBuilder::new(stub());
        builder.spawn(InstanceId::new([1; 32]), contracts::COIN, vec![]);
        builder.unshift(Instruction::invoke(
            InstanceId::new([2; 32]),
            contracts::COIN,
            "fetch",
            vec![],
        ));
        assert_eq!(builder.instructions()[0].target, InstanceId::new([2; 32]));
        assert_eq!(builder.instructions().len(), 2);
    }

    #[test]
    fn clone_fresh_is_empty() {
        let mut builder = TransactionBuilder::new(stub());
        builder.spawn(InstanceId::new([1; 32]), contracts::COIN, vec![]);
        let fresh = builder.clone_fresh();
        assert!(fresh.is_empty());
        assert_eq!(builder.instructions().len(), 1);
    }
}
