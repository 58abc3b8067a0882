//! Node host
//!
//! A [`Node`] bundles one party's services in a [`ServiceHub`] and runs a
//! dispatcher that starts the matching responder for every session another
//! node opens to it. Each responder runs as its own task, so runs on
//! different obligations never wait on each other.
//!
//! [`LocalNetwork`] wires several nodes to one network map, one in-process
//! network and one notary.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ProtocolConfig;
use crate::core_types::{Amount, LinearId};
use crate::crypto::{KeyPair, PublicKey};
use crate::identity::{IdentityService, KeyStore, NetworkMap, Party};
use crate::ledger::{
    CommitService, InMemoryNotary, SignedTransaction, TransactionSignature, Vault, WireTransaction,
};
use crate::network::{FlowKind, Network, Session, SessionError, SessionInit};
use crate::obligation::{Contract, ObligationContract};
use crate::protocol::{
    TransferError, TransferInitiator, TransferResponder, finality, identity_sync, issue,
    swap_identities,
};

/// Services a protocol run may use on its own node.
pub struct ServiceHub {
    pub identity: Party,
    pub keys: Arc<KeyStore>,
    pub identities: Arc<IdentityService>,
    pub vault: Arc<Vault>,
    pub network: Arc<Network>,
    pub notary: Arc<dyn CommitService>,
    pub contract: Arc<dyn Contract>,
}

impl ServiceHub {
    pub async fn open_session(&self, to: &Party, flow: FlowKind) -> Result<Session, SessionError> {
        self.network.open_session(&self.identity, to, flow).await
    }

    /// First signature on a transaction this node built.
    pub fn sign_initial(
        &self,
        tx: WireTransaction,
        key: &PublicKey,
    ) -> Result<SignedTransaction, TransferError> {
        let bytes = self
            .keys
            .sign(key, tx.id().as_bytes())
            .ok_or_else(|| TransferError::Signature(format!("no private key for {}", key)))?;
        Ok(SignedTransaction::new(
            tx,
            vec![TransactionSignature::new(*key, bytes)],
        ))
    }
}

pub struct Node {
    hub: Arc<ServiceHub>,
    dispatcher: JoinHandle<()>,
}

impl Node {
    /// Start the dispatcher on the current runtime.
    pub fn start(
        hub: Arc<ServiceHub>,
        inbox: mpsc::Receiver<SessionInit>,
        config: &ProtocolConfig,
    ) -> Self {
        let dispatcher = tokio::spawn(dispatch(hub.clone(), inbox, config.flow_timeout()));
        info!(node = %hub.identity, "Node started");
        Self { hub, dispatcher }
    }

    pub fn identity(&self) -> &Party {
        &self.hub.identity
    }

    pub fn hub(&self) -> &Arc<ServiceHub> {
        &self.hub
    }

    pub fn vault(&self) -> &Vault {
        &self.hub.vault
    }

    pub fn identities(&self) -> &IdentityService {
        &self.hub.identities
    }

    /// Borrow `amount` from `lender`.
    pub async fn issue_obligation(
        &self,
        lender: &Party,
        amount: Amount,
        anonymous: bool,
    ) -> Result<SignedTransaction, TransferError> {
        issue::issue_obligation(&self.hub, lender, amount, anonymous).await
    }

    /// A transfer run that has not started yet, for callers that observe its stages.
    pub fn transfer_initiator(
        &self,
        linear_id: LinearId,
        new_lender: &Party,
        anonymous: bool,
    ) -> TransferInitiator {
        TransferInitiator::new(self.hub.clone(), linear_id, new_lender.clone(), anonymous)
    }

    pub async fn transfer_obligation(
        &self,
        linear_id: LinearId,
        new_lender: &Party,
        anonymous: bool,
    ) -> Result<SignedTransaction, TransferError> {
        self.transfer_initiator(linear_id, new_lender, anonymous)
            .run()
            .await
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(
    hub: Arc<ServiceHub>,
    mut inbox: mpsc::Receiver<SessionInit>,
    flow_timeout: Option<Duration>,
) {
    while let Some(init) = inbox.recv().await {
        tokio::spawn(respond(hub.clone(), init, flow_timeout));
    }
}

async fn respond(hub: Arc<ServiceHub>, init: SessionInit, flow_timeout: Option<Duration>) {
    let SessionInit { flow, mut session } = init;
    let counterparty = session.counterparty().clone();

    let work = run_responder(&hub, flow, &mut session);
    let outcome = match flow_timeout {
        Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
            Err(TransferError::Session(SessionError::Timeout {
                counterparty: counterparty.name().to_string(),
                after_ms: limit.as_millis() as u64,
            }))
        }),
        None => work.await,
    };

    match outcome {
        Ok(()) => info!(node = %hub.identity, flow = %flow, counterparty = %counterparty, "Responder finished"),
        Err(e) => warn!(
            node = %hub.identity,
            flow = %flow,
            counterparty = %counterparty,
            code = e.code(),
            error = %e,
            "Responder failed"
        ),
    }
}

async fn run_responder(
    hub: &Arc<ServiceHub>,
    flow: FlowKind,
    session: &mut Session,
) -> Result<(), TransferError> {
    match flow {
        FlowKind::IssueObligation => issue::respond(hub, session).await.map(|_| ()),
        FlowKind::TransferObligation => TransferResponder::new(hub.clone())
            .run(session)
            .await
            .map(|_| ()),
        FlowKind::IdentitySync => identity_sync::receive(hub, session).await,
        FlowKind::SwapIdentities => swap_identities::exchange(hub, session).await.map(|_| ()),
        FlowKind::ReceiveFinality => finality::receive_finalised(hub, session).await.map(|_| ()),
    }
}

const NOTARY_NAME: &str = "O=Notary,L=Zurich,C=CH";

/// Nodes sharing one network map, network and notary in this process.
pub struct LocalNetwork {
    config: ProtocolConfig,
    network_map: Arc<NetworkMap>,
    network: Arc<Network>,
    notary: Arc<InMemoryNotary>,
}

impl LocalNetwork {
    pub fn new(config: ProtocolConfig) -> Self {
        let network_map = Arc::new(NetworkMap::new());
        let notary = Arc::new(InMemoryNotary::new(NOTARY_NAME, KeyPair::generate()));
        network_map.register(notary.identity().clone());
        let network = Arc::new(Network::new(
            config.session_buffer,
            config.session_timeout(),
        ));
        Self {
            config,
            network_map,
            network,
            notary,
        }
    }

    pub fn notary(&self) -> &Arc<InMemoryNotary> {
        &self.notary
    }

    pub fn network_map(&self) -> &Arc<NetworkMap> {
        &self.network_map
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn create_node(&self, name: &str) -> Node {
        self.create_node_with_contract(name, Arc::new(ObligationContract))
    }

    /// Node whose rule engine is `contract`, e.g. one that refuses to sign.
    pub fn create_node_with_contract(&self, name: &str, contract: Arc<dyn Contract>) -> Node {
        let legal = KeyPair::generate();
        let identity = Party::new(name, legal.public());
        self.network_map.register(identity.clone());

        let keys = Arc::new(KeyStore::new(legal));
        let identities = Arc::new(IdentityService::new(self.network_map.clone()));
        let vault = Arc::new(Vault::new(name, keys.clone(), identities.clone()));
        let inbox = self.network.register(&identity);

        let hub = Arc::new(ServiceHub {
            identity,
            keys,
            identities,
            vault,
            network: self.network.clone(),
            notary: self.notary.clone(),
            contract,
        });
        Node::start(hub, inbox, &self.config)
    }
}
