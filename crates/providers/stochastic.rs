use ethereum_types::{Address, U256};
use rand::{Rng, SeedableRng, rngs::StdRng};
use replay_executor::{Consumer, PSEUDO_TX, Provider, ReplayError, WorkItem};
use replay_processor::RecordedTx;
use replay_state::{Account, WorldState};
use tracing::debug;

const TRANSFER_GAS: u64 = 21_000;
const INITIAL_BALANCE: u64 = 1_000_000_000_000_000_000;
const BLOCK_REWARD: u64 = 2_000_000_000_000_000_000;

/// Generates a reproducible synthetic workload of value transfers between a
/// fixed set of accounts, closing every block with a reward paid to a
/// coinbase account through a pseudo transaction.
///
/// The generator simulates the world state itself, starting from
/// [`StochasticProvider::genesis`] at block zero, so that every recorded
/// input alloc matches the state produced by replaying all previous items.
/// Blocks below the requested range are generated but not delivered, which
/// makes the content of a block independent of the range.
#[derive(Debug, Clone)]
pub struct StochasticProvider {
    seed: u64,
    accounts: usize,
    txs_per_block: usize,
}

impl StochasticProvider {
    pub fn new(seed: u64, accounts: usize, txs_per_block: usize) -> Self {
        Self {
            seed,
            accounts: accounts.max(2),
            txs_per_block,
        }
    }

    pub fn coinbase() -> Address {
        Address::repeat_byte(0xcb)
    }

    fn account(index: usize) -> Address {
        Address::from_low_u64_be(index as u64 + 1)
    }

    /// World state the workload starts from.
    pub fn genesis(&self) -> WorldState {
        (0..self.accounts)
            .map(|i| (Self::account(i), Account::new(U256::from(INITIAL_BALANCE), 0)))
            .collect()
    }

    fn transfer(&self, rng: &mut StdRng, world: &mut WorldState) -> RecordedTx {
        let sender = Self::account(rng.gen_range(0..self.accounts));
        let mut recipient = Self::account(rng.gen_range(0..self.accounts - 1));
        if recipient == sender {
            recipient = Self::account(self.accounts - 1);
        }
        let before_sender = world.get(&sender).cloned().unwrap_or_default();
        let before_recipient = world.get(&recipient).cloned().unwrap_or_default();

        let max = before_sender.balance / 2;
        let amount = if max.is_zero() {
            U256::zero()
        } else {
            U256::from(rng.gen_range(0..=max.low_u64()))
        };
        let after_sender = Account {
            balance: before_sender.balance - amount,
            nonce: before_sender.nonce + 1,
            ..before_sender.clone()
        };
        let after_recipient = Account {
            balance: before_recipient.balance + amount,
            ..before_recipient.clone()
        };

        let tx = RecordedTx {
            input_alloc: WorldState::new()
                .with_account(sender, before_sender)
                .with_account(recipient, before_recipient),
            output_alloc: WorldState::new()
                .with_account(sender, after_sender.clone())
                .with_account(recipient, after_recipient.clone()),
            gas_limit: TRANSFER_GAS + rng.gen_range(0..TRANSFER_GAS),
            gas_used: TRANSFER_GAS,
        };
        world.insert(sender, after_sender);
        world.insert(recipient, after_recipient);
        tx
    }

    fn reward(world: &mut WorldState) -> RecordedTx {
        let coinbase = Self::coinbase();
        let before = world.get(&coinbase).cloned().unwrap_or_default();
        let after = Account {
            balance: before.balance + U256::from(BLOCK_REWARD),
            ..before.clone()
        };
        world.insert(coinbase, after.clone());
        RecordedTx {
            input_alloc: WorldState::new().with_account(coinbase, before),
            output_alloc: WorldState::new().with_account(coinbase, after),
            ..Default::default()
        }
    }
}

impl Provider<RecordedTx> for StochasticProvider {
    fn run(
        &mut self,
        from: u64,
        to: u64,
        consumer: &mut Consumer<'_, RecordedTx>,
    ) -> Result<(), ReplayError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut world = self.genesis();
        debug!(seed = self.seed, accounts = self.accounts, "Generating stochastic workload");
        for block in 0..to {
            let deliver = block >= from;
            for transaction in 0..self.txs_per_block {
                let tx = self.transfer(&mut rng, &mut world);
                if deliver {
                    consumer(WorkItem::new(block, transaction as u32, tx))?;
                }
            }
            let reward = Self::reward(&mut world);
            if deliver {
                consumer(WorkItem::new(block, PSEUDO_TX, reward))?;
            }
        }
        Ok(())
    }
}
