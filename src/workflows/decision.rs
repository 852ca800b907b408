// Bid decision workflow
// Approve/Reject moves the bid and, on approval, closes its tender atomically

use tracing::{info, warn, Instrument};

use crate::error::{MarketError, Result};
use crate::model::{Bid, Decision, TenderStatus};
use crate::observability::{create_workflow_span, OperationTimer};
use crate::relationships::RelationshipQueries;
use crate::store::BidStore;
use crate::telemetry::generate_correlation_id;
use crate::transaction::TxManager;

#[derive(Debug, Clone)]
pub struct DecisionWorkflow {
    relationships: RelationshipQueries,
    bids: BidStore,
    transactions: TxManager,
}

impl DecisionWorkflow {
    pub fn new(relationships: RelationshipQueries, bids: BidStore, transactions: TxManager) -> Self {
        Self {
            relationships,
            bids,
            transactions,
        }
    }

    /// Apply `decision` to a published bid on behalf of `actor`.
    ///
    /// The actor must be responsible for the organization owning the bid's
    /// tender. Under concurrent decisions on one bid exactly one succeeds; the
    /// rest fail with `BidNotPublished` and leave no trace.
    pub async fn submit_decision(&self, actor: &str, bid_id: &str, decision: Decision) -> Result<Bid> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("decision_workflow", &correlation_id);

        async move {
            let timer = OperationTimer::new("submit_decision");
            info!(actor = %actor, bid_id = %bid_id, decision = ?decision, "Submitting bid decision");

            let organization_id = self.relationships.org_id_of_bid(bid_id).await?;
            if !self
                .relationships
                .is_user_responsible_for_org(actor, &organization_id)
                .await?
            {
                warn!(actor = %actor, organization_id = %organization_id, "Decision refused");
                return Err(MarketError::NotResponsible {
                    username: actor.to_string(),
                    organization_id,
                });
            }

            let target = decision.bid_status();
            let owned_bid_id = bid_id.to_string();
            let closed_tender = self
                .transactions
                .decision_transaction(|tx| async move {
                    let tender_id = tx
                        .bids
                        .decide_if_published(&owned_bid_id, target)
                        .await?
                        .ok_or_else(|| MarketError::BidNotPublished {
                            bid_id: owned_bid_id.clone(),
                        })?;

                    if decision != Decision::Approve {
                        return Ok(None);
                    }

                    if !tx
                        .tenders
                        .set_status_if_open(&tender_id, TenderStatus::Closed)
                        .await?
                    {
                        return Err(MarketError::TenderNotPublished { tender_id });
                    }
                    Ok(Some(tender_id))
                })
                .await?;

            let bid = self.bids.get_by_id(bid_id).await?;
            info!(
                bid_id = %bid_id,
                status = %bid.status,
                closed_tender = ?closed_tender,
                "Bid decision committed"
            );
            timer.finish();
            Ok(bid)
        }
        .instrument(span)
        .await
    }
}
