//! Network interface collectors, one per host or VM.

use crate::schema::AllowList;
use crate::table::{no_calculated_stats, Convert, IdentityLabel, Layout, Property, StatTable};
use crate::EntityCollector;
use prism_client::{ApiVersion, PrismClient};
use prism_common::entity::entities_from_body;
use prism_common::MetricSink;
use serde_json::Value;
use std::sync::Arc;

const NETWORK_STATS: AllowList = AllowList::new(&[
    "network.received_bytes",
    "network.received_pkts",
    "network.error_received_pkts",
    "network.transmitted_bytes",
    "network.transmitted_pkts",
    "network.error_transmitted_pkts",
]);

static HOST_NIC_LAYOUT: Layout = Layout {
    namespace: "nutanix_hosts_network",
    stat_maps: &["stats", "usage_stats"],
    allow: NETWORK_STATS,
    identity: &[
        IdentityLabel::required("uuid", &["uuid"]),
        IdentityLabel::optional("host_uuid", &["node_uuid", "host_uuid"]),
    ],
    properties: &[
        Property::text("node_uuid"),
        Property::text("uuid"),
        Property::text("name"),
        Property::text("host_name"),
        Property::text("mac_address"),
        Property::text("ipv4_addresses"),
        Property::text("mtu_in_bytes"),
    ],
    fields: &[],
    calculate: no_calculated_stats,
};

static VM_NIC_LAYOUT: Layout = Layout {
    namespace: "nutanix_vmnics",
    stat_maps: &["stats"],
    allow: NETWORK_STATS,
    identity: &[
        IdentityLabel::required("uuid", &["uuid"]),
        IdentityLabel::optional("vm_uuid", &["vmUuid", "vm_uuid"]),
    ],
    properties: &[
        Property::text("vm_uuid"),
        Property::text("uuid"),
        Property::text("vm_name"),
        Property::converted("mac_address", "macAddress", Convert::Text),
        Property::converted("ipv4_addresses", "ipv4Addresses", Convert::Text),
        Property::text("name"),
        Property::converted("mtu_in_bytes", "mtuInBytes", Convert::Text),
    ],
    fields: &[],
    calculate: no_calculated_stats,
};

/// Parent entity kind a NIC collector hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicKind {
    Host,
    Vm,
}

impl NicKind {
    fn version(self) -> ApiVersion {
        match self {
            NicKind::Host => ApiVersion::V2,
            NicKind::Vm => ApiVersion::V1,
        }
    }

    fn path(self, parent_uuid: &str) -> String {
        match self {
            NicKind::Host => format!("hosts/{parent_uuid}/host_nics"),
            NicKind::Vm => format!("vms/{parent_uuid}/virtual_nics"),
        }
    }

    fn layout(self) -> &'static Layout {
        match self {
            NicKind::Host => &HOST_NIC_LAYOUT,
            NicKind::Vm => &VM_NIC_LAYOUT,
        }
    }

    /// Keys injected into each NIC entity when upstream omits them.
    fn parent_keys(self) -> (&'static str, &'static str) {
        match self {
            NicKind::Host => ("host_uuid", "host_name"),
            NicKind::Vm => ("vm_uuid", "vm_name"),
        }
    }
}

/// NIC metrics of a single host or VM.
pub struct NicCollector {
    client: Arc<PrismClient>,
    kind: NicKind,
    parent_uuid: String,
    parent_name: String,
    table: StatTable,
}

impl NicCollector {
    pub fn new(client: Arc<PrismClient>, kind: NicKind, parent_uuid: String, parent_name: String) -> Self {
        Self {
            client,
            kind,
            parent_uuid,
            parent_name,
            table: StatTable::new(kind.layout()),
        }
    }

    pub fn parent_uuid(&self) -> &str {
        &self.parent_uuid
    }
}

#[async_trait::async_trait]
impl EntityCollector for NicCollector {
    fn name(&self) -> &str {
        match self.kind {
            NicKind::Host => "hostnics",
            NicKind::Vm => "vmnics",
        }
    }

    async fn describe(&mut self) -> prism_client::Result<()> {
        self.table.reset();
        let path = self.kind.path(&self.parent_uuid);
        let body = self.client.get(self.kind.version(), &path, &[]).await?;

        let (uuid_key, name_key) = self.kind.parent_keys();
        let mut entities = entities_from_body(body);
        for nic in &mut entities {
            nic.entry(uuid_key)
                .or_insert_with(|| Value::String(self.parent_uuid.clone()));
            nic.entry(name_key)
                .or_insert_with(|| Value::String(self.parent_name.clone()));
        }
        tracing::debug!(
            parent = %self.parent_uuid,
            nics = entities.len(),
            namespace = self.table.namespace(),
            "NIC discovery done"
        );
        self.table.load(entities);
        Ok(())
    }

    fn collect(&self, sink: &mut MetricSink) {
        self.table.emit(sink);
    }
}
