//! Routes and route building.

use std::collections::HashSet;

use chainpay_types::{Address, Amount, NodeId, RoutingNode, SessionId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("route has no source")]
    MissingSource,

    #[error("route has no destination")]
    MissingDestination,

    #[error("route already has a source")]
    DuplicateSource,

    #[error("route already has a destination")]
    DuplicateDestination,

    #[error("address {0} appears twice in the route")]
    DuplicateAddress(Address),

    #[error("hop added out of order: {0}")]
    OutOfOrder(&'static str),

    #[error("route starts at {found}, payer is {expected}")]
    SourceMismatch { expected: Address, found: Address },

    #[error("route ends at {found}, payee is {expected}")]
    DestinationMismatch { expected: Address, found: Address },

    #[error("no way to reach hop {0}")]
    UnresolvedHop(NodeId),

    #[error("no route for session {0}")]
    NoRoute(SessionId),

    #[error("route amounts overflow")]
    AmountOverflow,
}

/// Amounts of the leg paying one hop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegAmounts {
    pub total_in: Amount,
    pub total_out: Amount,
    pub fee: Amount,
}

/// Ordered hops of one session: payer first, payee last, at least two.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    hops: Vec<RoutingNode>,
}

impl Route {
    pub fn hops(&self) -> &[RoutingNode] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn payer(&self) -> &RoutingNode {
        &self.hops[0]
    }

    pub fn payee(&self) -> &RoutingNode {
        &self.hops[self.hops.len() - 1]
    }

    /// Check the route starts at `from` and ends at `to`.
    pub fn validate(&self, from: &Address, to: &Address) -> Result<(), RoutingError> {
        if &self.payer().address != from {
            return Err(RoutingError::SourceMismatch {
                expected: from.clone(),
                found: self.payer().address.clone(),
            });
        }
        if &self.payee().address != to {
            return Err(RoutingError::DestinationMismatch {
                expected: to.clone(),
                found: self.payee().address.clone(),
            });
        }
        Ok(())
    }

    /// Amounts of every leg for a payment delivering `amount` to the payee.
    ///
    /// Entry `k` is the leg from hop `k` to hop `k + 1`. Each intermediary
    /// adds its fee on top of what it forwards; the payer and the payee
    /// collect nothing.
    pub fn leg_amounts(&self, amount: Amount) -> Result<Vec<LegAmounts>, RoutingError> {
        let last = self.hops.len() - 1;
        let mut legs = vec![
            LegAmounts {
                total_in: Amount::ZERO,
                total_out: Amount::ZERO,
                fee: Amount::ZERO,
            };
            last
        ];
        let mut total_out = amount;
        for index in (1..=last).rev() {
            let fee = if index == last {
                Amount::ZERO
            } else {
                self.hops[index].fee
            };
            let total_in = total_out
                .checked_add(fee)
                .ok_or(RoutingError::AmountOverflow)?;
            legs[index - 1] = LegAmounts {
                total_in,
                total_out,
                fee,
            };
            total_out = total_in;
        }
        Ok(legs)
    }

    /// What the payer pays in total.
    pub fn total_cost(&self, amount: Amount) -> Result<Amount, RoutingError> {
        Ok(self
            .leg_amounts(amount)?
            .first()
            .map(|leg| leg.total_in)
            .unwrap_or(amount))
    }
}

/// Builds a [`Route`] in order: source, chain hops, destination.
#[derive(Debug, Default)]
pub struct RouteBuilder {
    source: Option<RoutingNode>,
    chain: Vec<RoutingNode>,
    destination: Option<RoutingNode>,
    addresses: HashSet<Address>,
}

impl RouteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&mut self, node: &RoutingNode) -> Result<(), RoutingError> {
        if !self.addresses.insert(node.address.clone()) {
            return Err(RoutingError::DuplicateAddress(node.address.clone()));
        }
        Ok(())
    }

    pub fn add_source(&mut self, node: RoutingNode) -> Result<&mut Self, RoutingError> {
        if self.source.is_some() {
            return Err(RoutingError::DuplicateSource);
        }
        if !self.chain.is_empty() || self.destination.is_some() {
            return Err(RoutingError::OutOfOrder("source must come first"));
        }
        self.claim(&node)?;
        self.source = Some(node);
        Ok(self)
    }

    pub fn add_chain(&mut self, node: RoutingNode) -> Result<&mut Self, RoutingError> {
        if self.source.is_none() {
            return Err(RoutingError::OutOfOrder("chain hop before source"));
        }
        if self.destination.is_some() {
            return Err(RoutingError::OutOfOrder("chain hop after destination"));
        }
        self.claim(&node)?;
        self.chain.push(node);
        Ok(self)
    }

    pub fn add_destination(&mut self, node: RoutingNode) -> Result<&mut Self, RoutingError> {
        if self.destination.is_some() {
            return Err(RoutingError::DuplicateDestination);
        }
        if self.source.is_none() {
            return Err(RoutingError::OutOfOrder("destination before source"));
        }
        self.claim(&node)?;
        self.destination = Some(node);
        Ok(self)
    }

    pub fn build(self) -> Result<Route, RoutingError> {
        let source = self.source.ok_or(RoutingError::MissingSource)?;
        let destination = self.destination.ok_or(RoutingError::MissingDestination)?;
        let mut hops = Vec::with_capacity(self.chain.len() + 2);
        hops.push(source);
        hops.extend(self.chain);
        hops.push(destination);
        Ok(Route { hops })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hop(name: &str, fee: u64) -> RoutingNode {
        RoutingNode::new(format!("node-{name}"), format!("hop_{name}"), Amount::from(fee))
    }

    fn route(chain_fees: &[u64]) -> Route {
        let mut builder = RouteBuilder::new();
        builder.add_source(hop("p", 0)).unwrap();
        for (i, fee) in chain_fees.iter().enumerate() {
            builder.add_chain(hop(&format!("c{i}"), *fee)).unwrap();
        }
        builder.add_destination(hop("s", 0)).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn builds_in_order() {
        let route = route(&[10, 10]);
        let names: Vec<_> = route.hops().iter().map(|h| h.node_id.to_string()).collect();
        assert_eq!(names, vec!["node-p", "node-c0", "node-c1", "node-s"]);
        assert!(route
            .validate(&Address::new("hop_p"), &Address::new("hop_s"))
            .is_ok());
    }

    #[test]
    fn endpoints_must_match() {
        let route = route(&[]);
        assert!(matches!(
            route.validate(&Address::new("hop_x"), &Address::new("hop_s")),
            Err(RoutingError::SourceMismatch { .. })
        ));
        assert!(matches!(
            route.validate(&Address::new("hop_p"), &Address::new("hop_x")),
            Err(RoutingError::DestinationMismatch { .. })
        ));
    }

    #[test]
    fn rejects_second_source_and_destination() {
        let mut builder = RouteBuilder::new();
        builder.add_source(hop("p", 0)).unwrap();
        assert_eq!(
            builder.add_source(hop("q", 0)).unwrap_err(),
            RoutingError::DuplicateSource
        );
        builder.add_destination(hop("s", 0)).unwrap();
        assert_eq!(
            builder.add_destination(hop("t", 0)).unwrap_err(),
            RoutingError::DuplicateDestination
        );
        assert!(matches!(
            builder.add_chain(hop("a", 10)),
            Err(RoutingError::OutOfOrder(_))
        ));
    }

    #[test]
    fn rejects_duplicate_addresses() {
        let mut builder = RouteBuilder::new();
        builder.add_source(hop("p", 0)).unwrap();
        builder.add_chain(hop("a", 10)).unwrap();
        assert_eq!(
            builder.add_chain(hop("a", 10)).unwrap_err(),
            RoutingError::DuplicateAddress(Address::new("hop_a"))
        );
    }

    #[test]
    fn incomplete_routes_do_not_build() {
        assert_eq!(
            RouteBuilder::new().build().unwrap_err(),
            RoutingError::MissingSource
        );
        let mut builder = RouteBuilder::new();
        builder.add_source(hop("p", 0)).unwrap();
        assert_eq!(builder.build().unwrap_err(), RoutingError::MissingDestination);
    }

    #[test]
    fn chain_before_source_is_out_of_order() {
        assert!(matches!(
            RouteBuilder::new().add_chain(hop("a", 10)),
            Err(RoutingError::OutOfOrder(_))
        ));
    }

    #[test]
    fn leg_amounts_add_intermediary_fees() {
        let legs = route(&[10, 10]).leg_amounts(Amount::new(300)).unwrap();
        let totals: Vec<(u128, u128, u128)> = legs
            .iter()
            .map(|l| (l.total_in.raw(), l.total_out.raw(), l.fee.raw()))
            .collect();
        assert_eq!(totals, vec![(320, 310, 10), (310, 300, 10), (300, 300, 0)]);
    }

    #[test]
    fn payee_fee_is_ignored() {
        let mut builder = RouteBuilder::new();
        builder.add_source(hop("p", 5)).unwrap();
        builder.add_destination(hop("s", 7)).unwrap();
        let route = builder.build().unwrap();
        assert_eq!(route.total_cost(Amount::new(100)).unwrap(), Amount::new(100));
    }

    proptest! {
        #[test]
        fn endpoints_are_payer_and_payee(fees in prop::collection::vec(0u64..1_000, 0..6)) {
            let route = route(&fees);
            prop_assert_eq!(&route.payer().address, &Address::new("hop_p"));
            prop_assert_eq!(&route.payee().address, &Address::new("hop_s"));
            let expected: u64 = 500 + fees.iter().sum::<u64>();
            prop_assert_eq!(route.total_cost(Amount::new(500)).unwrap(), Amount::from(expected));
        }
    }
}
