//! # Custody Flow Integration Tests
//!
//! Three participants over one shared content store:
//!
//! - `A`: principal
//! - `B`: beneficiary
//! - `C`: custodian (master fiduciary of everyone)
//!
//! The first group drives transactions by hand through `RecordingLedger`s so
//! every hop can be inspected. The last test runs the gateways over a shared
//! in-memory ledger.

use std::sync::Arc;
use std::time::Duration;

use custody_protocol::{
    BusLedger, CustodyApi, CustodyConfig, CustodyDependencies, CustodyError, CustodyPlugin,
    CustodyService, FinalSecret, IdentityDocument, IdentitySecrets, InMemoryContentStore,
    InMemoryKVStore, Ledger, MockTimeSource, OrderDocument, OrderState, RecordingLedger,
    SafeguardSecretPlugin,
};
use shared_bus::{InMemoryLedger, LedgerFilter};
use shared_crypto::{public_key_from_private_hex, Secp256k1KeyPair};
use shared_types::{
    ContentId, Extension, LedgerTransaction, OrderListRequest, OrderReference, OrderRequest,
    OrderResponse, OrderSecretRequest, OrderSecretResponse, ParticipantId, Processor, SortOrder,
};
use tokio::sync::watch;
use tokio::time::timeout;

// =============================================================================
// TEST FIXTURES
// =============================================================================

const START: u64 = 1_700_000_000;

struct Node {
    service: CustodyService,
    ledger: Arc<RecordingLedger>,
    cid: ContentId,
}

impl Node {
    fn last_tx(&self) -> LedgerTransaction {
        self.ledger.submitted().last().cloned().expect("no transaction submitted")
    }

    fn tx_count(&self) -> usize {
        self.ledger.submitted().len()
    }
}

struct Network {
    time: Arc<MockTimeSource>,
    a: Node,
    b: Node,
    c: Node,
}

async fn node(
    id: &str,
    content: &Arc<InMemoryContentStore>,
    time: &Arc<MockTimeSource>,
    plugin: Arc<dyn CustodyPlugin>,
) -> Node {
    let ledger = Arc::new(RecordingLedger::new());
    let service = CustodyService::new(
        CustodyConfig::for_testing(id, "C"),
        CustodyDependencies {
            content: content.clone(),
            kv: Arc::new(InMemoryKVStore::new()),
            ledger: ledger.clone(),
            time: time.clone(),
        },
        plugin,
    );
    let cid = service.bootstrap().await.unwrap();
    Node {
        service,
        ledger,
        cid,
    }
}

async fn network_with(custodian_plugin: Arc<dyn CustodyPlugin>) -> Network {
    let content = Arc::new(InMemoryContentStore::new());
    let time = Arc::new(MockTimeSource::new(START));
    let safeguard: Arc<dyn CustodyPlugin> = Arc::new(SafeguardSecretPlugin::new());

    let a = node("A", &content, &time, safeguard.clone()).await;
    let b = node("B", &content, &time, safeguard).await;
    let c = node("C", &content, &time, custodian_plugin).await;

    for (node, peers) in [(&a, [&b, &c]), (&b, [&a, &c]), (&c, [&a, &b])] {
        for peer in peers {
            node.service.register_peer(&peer.cid).await.unwrap();
        }
    }
    Network { time, a, b, c }
}

async fn network() -> Network {
    network_with(Arc::new(SafeguardSecretPlugin::new())).await
}

fn deposit_for(beneficiary: &Node) -> OrderRequest {
    OrderRequest {
        beneficiary_id_document_cid: Some(beneficiary.cid.clone()),
        extension: Extension::new(),
    }
}

fn redeem(reference: OrderReference) -> OrderSecretRequest {
    OrderSecretRequest {
        order_reference: reference,
        beneficiary_id_document_cid: None,
        extension: Extension::new(),
    }
}

/// Run phases 1 and 2; returns the reference and the reported commitment.
async fn deposit_and_commit(net: &Network) -> (OrderReference, String) {
    let receipt = net.a.service.order(deposit_for(&net.b)).await.unwrap();
    net.c
        .service
        .handle_transaction(&net.a.last_tx())
        .await
        .unwrap();
    net.a
        .service
        .handle_transaction(&net.c.last_tx())
        .await
        .unwrap();

    let report: OrderResponse = net.a.last_tx().decode_payload().unwrap();
    (receipt.order_reference, report.commitment)
}

/// A custodian that commits honestly but releases an unrelated key.
struct RogueCustodian(SafeguardSecretPlugin);

impl CustodyPlugin for RogueCustodian {
    fn name(&self) -> &'static str {
        "rogue"
    }

    fn prepare_commitment(
        &self,
        order: &OrderDocument,
        custodian: &IdentitySecrets,
    ) -> Result<String, CustodyError> {
        self.0.prepare_commitment(order, custodian)
    }

    fn produce_redemption_payload(
        &self,
        order: &OrderDocument,
        beneficiary: &IdentityDocument,
    ) -> Result<String, CustodyError> {
        self.0.produce_redemption_payload(order, beneficiary)
    }

    fn release_secret(
        &self,
        _order: &OrderDocument,
        _custodian: &IdentitySecrets,
    ) -> Result<String, CustodyError> {
        Ok(Secp256k1KeyPair::generate().to_hex())
    }

    fn produce_final_secret(
        &self,
        order: &OrderDocument,
        beneficiary: &IdentitySecrets,
    ) -> Result<FinalSecret, CustodyError> {
        self.0.produce_final_secret(order, beneficiary)
    }
}

// =============================================================================
// PHASE-BY-PHASE FLOW
// =============================================================================

#[tokio::test]
async fn test_happy_path_delivers_committed_secret() {
    let net = network().await;

    // Phase 1: principal deposits
    let receipt = net.a.service.order(deposit_for(&net.b)).await.unwrap();
    assert_eq!(receipt.state, OrderState::Deposited);
    let fulfill = net.a.last_tx();
    assert_eq!(fulfill.processor, Processor::FulfillRequest);
    assert_eq!(fulfill.recipient_ids, vec![ParticipantId::from("C")]);
    assert_eq!(fulfill.reference().unwrap(), receipt.order_reference);

    // Phase 2: custodian commits
    net.c.service.handle_transaction(&fulfill).await.unwrap();
    let committed = net.c.last_tx();
    assert_eq!(committed.processor, Processor::FulfillResponse);
    assert_eq!(committed.recipient_ids, vec![ParticipantId::from("A")]);

    net.a.service.handle_transaction(&committed).await.unwrap();
    let report = net.a.last_tx();
    assert_eq!(report.processor, Processor::OrderResponse);
    let report: OrderResponse = report.decode_payload().unwrap();
    assert_eq!(report.order_reference, receipt.order_reference);

    // Phase 3: principal requests release
    net.time.advance(60);
    let receipt3 = net
        .a
        .service
        .order_secret(redeem(receipt.order_reference))
        .await
        .unwrap();
    assert_eq!(receipt3.state, OrderState::RedemptionRequested);
    let request = net.a.last_tx();
    assert_eq!(request.processor, Processor::FulfillOrderSecretRequest);

    // Phase 4: custodian releases to principal and beneficiary
    net.c.service.handle_transaction(&request).await.unwrap();
    let released = net.c.last_tx();
    assert_eq!(released.processor, Processor::FulfillOrderSecretResponse);
    assert_eq!(released.recipient_ids, vec![ParticipantId::from("A"), ParticipantId::from("B")]);

    // Principal records, beneficiary verifies and reports
    assert_eq!(
        net.a.service.handle_transaction(&released).await.unwrap(),
        None
    );
    net.b.service.handle_transaction(&released).await.unwrap();
    let delivered = net.b.last_tx();
    assert_eq!(delivered.processor, Processor::OrderSecretResponse);
    assert_eq!(delivered.recipient_ids, vec![ParticipantId::from("B")]);

    let delivered: OrderSecretResponse = delivered.decode_payload().unwrap();
    assert_eq!(delivered.order_reference, receipt.order_reference);
    assert_eq!(delivered.commitment, report.commitment);
    assert_eq!(
        public_key_from_private_hex(&delivered.secret).unwrap(),
        report.commitment
    );

    for node in [&net.a, &net.b, &net.c] {
        let entry = node
            .service
            .chain()
            .latest(&receipt.order_reference)
            .unwrap()
            .unwrap();
        assert_eq!(entry.state, OrderState::SecretReleased);
    }
}

#[tokio::test]
async fn test_history_walks_back_to_deposit() {
    let net = network().await;
    let (reference, _) = deposit_and_commit(&net).await;
    net.a.service.order_secret(redeem(reference)).await.unwrap();
    net.c
        .service
        .handle_transaction(&net.a.last_tx())
        .await
        .unwrap();
    net.a
        .service
        .handle_transaction(&net.c.last_tx())
        .await
        .unwrap();

    let history = net.a.service.order_history(&reference).await.unwrap();
    let states: Vec<_> = history.iter().map(|(_, order)| order.state()).collect();
    assert_eq!(
        states,
        vec![
            OrderState::SecretReleased,
            OrderState::RedemptionRequested,
            OrderState::CommitmentReceived,
            OrderState::Deposited,
        ]
    );
    for pair in history.windows(2) {
        assert_eq!(pair[0].1.previous_cid(), Some(&pair[1].0));
    }
    assert!(history[3].1.previous_cid().is_none());
}

#[tokio::test]
async fn test_beneficiary_detects_wrong_release() {
    let net = network_with(Arc::new(RogueCustodian(SafeguardSecretPlugin::new()))).await;
    let (reference, _) = deposit_and_commit(&net).await;

    net.a.service.order_secret(redeem(reference)).await.unwrap();
    net.c
        .service
        .handle_transaction(&net.a.last_tx())
        .await
        .unwrap();
    let released = net.c.last_tx();
    let before = net.b.tx_count();

    let result = net.b.service.handle_transaction(&released).await;
    assert!(matches!(result, Err(CustodyError::IntegrityError(_))));
    assert_eq!(net.b.tx_count(), before);
    assert!(net.b.service.chain().latest(&reference).unwrap().is_none());
}

#[tokio::test]
async fn test_redelivery_is_idempotent() {
    let net = network().await;
    net.a.service.order(deposit_for(&net.b)).await.unwrap();
    let fulfill = net.a.last_tx();

    net.c.service.handle_transaction(&fulfill).await.unwrap();
    let after_first = net.c.tx_count();
    let committed = net.c.last_tx();

    assert_eq!(net.c.service.handle_transaction(&fulfill).await.unwrap(), None);
    assert_eq!(net.c.tx_count(), after_first);

    net.a.service.handle_transaction(&committed).await.unwrap();
    let reports = net.a.tx_count();
    assert_eq!(
        net.a.service.handle_transaction(&committed).await.unwrap(),
        None
    );
    assert_eq!(net.a.tx_count(), reports);
}

#[tokio::test]
async fn test_redemption_before_commitment_is_out_of_order() {
    let net = network().await;
    let receipt = net.a.service.order(deposit_for(&net.b)).await.unwrap();

    assert!(matches!(
        net.a.service.order_secret(redeem(receipt.order_reference)).await,
        Err(CustodyError::OutOfOrder(_))
    ));
    assert!(matches!(
        net.a.service.order_secret(redeem(OrderReference::generate())).await,
        Err(CustodyError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_second_redemption_is_out_of_order() {
    let net = network().await;
    let (reference, _) = deposit_and_commit(&net).await;
    net.a.service.order_secret(redeem(reference)).await.unwrap();

    assert!(matches!(
        net.a.service.order_secret(redeem(reference)).await,
        Err(CustodyError::OutOfOrder(_))
    ));
}

#[tokio::test]
async fn test_beneficiary_override_at_redemption() {
    let net = network().await;
    let receipt = net
        .a
        .service
        .order(OrderRequest::default())
        .await
        .unwrap();
    net.c
        .service
        .handle_transaction(&net.a.last_tx())
        .await
        .unwrap();
    net.a
        .service
        .handle_transaction(&net.c.last_tx())
        .await
        .unwrap();

    // No beneficiary on the order and none supplied
    assert!(matches!(
        net.a
            .service
            .order_secret(redeem(receipt.order_reference))
            .await,
        Err(CustodyError::ValidationError(_))
    ));

    let request = OrderSecretRequest {
        beneficiary_id_document_cid: Some(net.b.cid.clone()),
        ..redeem(receipt.order_reference)
    };
    net.a.service.order_secret(request).await.unwrap();
    net.c
        .service
        .handle_transaction(&net.a.last_tx())
        .await
        .unwrap();
    net.b
        .service
        .handle_transaction(&net.c.last_tx())
        .await
        .unwrap();
    assert_eq!(net.b.last_tx().processor, Processor::OrderSecretResponse);
}

#[tokio::test]
async fn test_non_recipient_cannot_read_deposit() {
    let net = network().await;
    let receipt = net.a.service.order(deposit_for(&net.b)).await.unwrap();

    let b_secrets = net.b.service.vault().secrets(&"B".into()).unwrap();
    let a_doc = net
        .b
        .service
        .vault()
        .identity_document(&"A".into())
        .await
        .unwrap();
    assert!(matches!(
        net.b
            .service
            .chain()
            .fetch(&receipt.order_cid, &b_secrets, &a_doc)
            .await,
        Err(CustodyError::DecryptError(_))
    ));
}

#[tokio::test]
async fn test_misaddressed_transaction_rejected() {
    let net = network().await;
    net.a.service.order(deposit_for(&net.b)).await.unwrap();

    assert!(matches!(
        net.b.service.handle_transaction(&net.a.last_tx()).await,
        Err(CustodyError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_resubmit_latest_published_revision() {
    let net = network().await;
    let receipt = net.a.service.order(deposit_for(&net.b)).await.unwrap();
    let original = net.a.last_tx();

    net.a
        .service
        .resubmit(receipt.order_reference)
        .await
        .unwrap();
    assert_eq!(net.a.last_tx(), original);

    net.c.service.handle_transaction(&original).await.unwrap();
    let committed = net.c.last_tx();
    net.c
        .service
        .resubmit(receipt.order_reference)
        .await
        .unwrap();
    assert_eq!(net.c.last_tx(), committed);

    // The principal's latest revision is now the custodian's
    net.a.service.handle_transaction(&committed).await.unwrap();
    assert!(matches!(
        net.a.service.resubmit(receipt.order_reference).await,
        Err(CustodyError::OutOfOrder(_))
    ));
}

#[tokio::test]
async fn test_order_list_pages_by_creation_time() {
    let net = network().await;
    let mut created = Vec::new();
    for _ in 0..5 {
        created.push(
            net.a
                .service
                .order(deposit_for(&net.b))
                .await
                .unwrap()
                .order_reference,
        );
        net.time.advance(10);
    }

    let page = |page, per_page, sort_by| OrderListRequest {
        page,
        per_page,
        sort_by,
    };
    let list = |request: OrderListRequest| {
        net.a
            .service
            .order_list(&request)
            .unwrap()
            .order_references
    };

    assert_eq!(list(page(0, 2, SortOrder::DateCreatedAsc)), created[0..2].to_vec());
    assert_eq!(list(page(1, 2, SortOrder::DateCreatedAsc)), created[2..4].to_vec());
    assert_eq!(list(page(2, 2, SortOrder::DateCreatedAsc)), created[4..5].to_vec());
    assert!(list(page(3, 2, SortOrder::DateCreatedAsc)).is_empty());
    assert_eq!(list(page(0, 1, SortOrder::default())), vec![created[4]]);
    assert_eq!(list(page(0, 0, SortOrder::DateCreatedAsc)), created);

    let status = net.a.service.status().unwrap();
    assert_eq!(status.order_count, 5);
    assert_eq!(status.node_id, "A");
    assert_eq!(status.master_fiduciary_id, "C");
}

#[tokio::test]
async fn test_get_order_and_dump() {
    let net = network().await;
    let (reference, commitment) = deposit_and_commit(&net).await;

    let latest = net.a.service.get_order(reference).await.unwrap();
    let order: OrderDocument = serde_json::from_str(&latest.order).unwrap();
    assert_eq!(order.state(), OrderState::CommitmentReceived);
    assert_eq!(
        order.commitment.unwrap().commitment_public_key,
        commitment
    );

    net.a.service.dump(reference).await.unwrap();
    let dump = net.a.last_tx();
    assert_eq!(dump.processor, Processor::Dump);
    assert_eq!(net.a.service.handle_transaction(&dump).await.unwrap(), None);

    assert!(matches!(
        net.a.service.get_order(OrderReference::generate()).await,
        Err(CustodyError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_bootstrap_is_repeatable_and_secrets_unique() {
    let net = network().await;
    assert_eq!(net.a.service.bootstrap().await.unwrap(), net.a.cid);
    assert!(matches!(
        net.a.service.vault().create_secrets(&"A".into()),
        Err(CustodyError::AlreadyExists(_))
    ));
}

// =============================================================================
// GATEWAYS OVER A SHARED LEDGER
// =============================================================================

#[tokio::test]
async fn test_end_to_end_over_ledger() {
    let content = Arc::new(InMemoryContentStore::new());
    let time = Arc::new(MockTimeSource::new(START));
    let bus = Arc::new(InMemoryLedger::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut services = Vec::new();
    for id in ["A", "B", "C"] {
        let ledger: Arc<dyn Ledger> = Arc::new(BusLedger::new(bus.clone()));
        let service = CustodyService::new(
            CustodyConfig::for_testing(id, "C"),
            CustodyDependencies {
                content: content.clone(),
                kv: Arc::new(InMemoryKVStore::new()),
                ledger,
                time: time.clone(),
            },
            Arc::new(SafeguardSecretPlugin::new()),
        );
        let cid = service.bootstrap().await.unwrap();
        services.push((service, cid));
    }
    for (service, _) in &services {
        for (_, cid) in &services {
            service.register_peer(cid).await.unwrap();
        }
    }

    let mut handles = Vec::new();
    for (service, _) in &services {
        let subscription = bus.subscribe(LedgerFilter::addressed_to(service.node_id().clone()));
        handles.push(service.spawn_gateway(subscription, shutdown_rx.clone()));
    }

    let mut committed = bus.subscribe(
        LedgerFilter::addressed_to("A".into()).with_processors(vec![Processor::OrderResponse]),
    );
    let mut delivered = bus.subscribe(
        LedgerFilter::addressed_to("B".into())
            .with_processors(vec![Processor::OrderSecretResponse]),
    );

    let (a, _) = &services[0];
    let (_, b_cid) = &services[1];
    let receipt = a
        .order(OrderRequest {
            beneficiary_id_document_cid: Some(b_cid.clone()),
            extension: Extension::new(),
        })
        .await
        .unwrap();

    let report = timeout(Duration::from_secs(5), committed.recv())
        .await
        .expect("timed out waiting for commitment")
        .expect("ledger closed");
    let report: OrderResponse = report.transaction.decode_payload().unwrap();
    assert_eq!(report.order_reference, receipt.order_reference);

    a.order_secret(redeem(receipt.order_reference)).await.unwrap();

    let secret = timeout(Duration::from_secs(5), delivered.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("ledger closed");
    let secret: OrderSecretResponse = secret.transaction.decode_payload().unwrap();
    assert_eq!(secret.order_reference, receipt.order_reference);
    assert_eq!(secret.commitment, report.commitment);

    // Settled orders release their per-reference workers.
    timeout(Duration::from_secs(5), async {
        while services
            .iter()
            .any(|(service, _)| service.gateway().worker_count() > 0)
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("workers did not retire");

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("gateway did not stop")
            .unwrap();
    }
}
