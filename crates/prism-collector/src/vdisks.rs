use crate::calc;
use crate::schema::AllowList;
use crate::table::{Convert, Field, IdentityLabel, Layout, Property, StatTable};
use crate::EntityCollector;
use prism_client::{ApiVersion, PrismClient};
use prism_common::{Entity, MetricSink};
use std::sync::Arc;

fn vdisk_calculations(vdisk: &mut Entity) {
    calc::add_tier_usage_total(vdisk);
    calc::add_write_io_size(vdisk);
}

static VDISK_LAYOUT: Layout = Layout {
    namespace: "nutanix_vdisks",
    stat_maps: &["stats"],
    allow: AllowList::new(&[
        "controller_total_read_io_size_kbytes",
        "controller_total_io_size_kbytes",
        "controller_num_read_io",
        "controller_num_write_io",
        "controller_avg_read_io_latency_usecs",
        "controller_avg_write_io_latency_usecs",
        "controller.storage_tier.cloud.pinned_usage_bytes",
        "controller.storage_tier.cloud.usage_bytes",
        "controller.storage_tier.das-sata.pinned_usage_bytes",
        "controller.storage_tier.das-sata.usage_bytes",
        "controller.storage_tier.ssd.pinned_usage_bytes",
        "controller.storage_tier.ssd.usage_bytes",
        calc::TOTAL_WRITE_IO_SIZE,
        calc::TIER_TOTAL_USAGE_BYTES,
    ])
    .excluding("histogram"),
    identity: &[
        IdentityLabel::required("uuid", &["uuid"]),
        IdentityLabel::optional("attached_vm_uuid", &["attached_vm_uuid"]),
    ],
    properties: &[
        Property::text("uuid"),
        Property::text("attached_vm_uuid"),
        Property::text("attached_vmname"),
        Property::text("storage_container_uuid"),
        Property::text("cluster_uuid"),
        Property::text("disk_address"),
        Property::converted("disk_capacity_in_mb", "disk_capacity_in_bytes", Convert::Scaled(1024.0 * 1024.0)),
    ],
    fields: &[Field::number("disk_capacity_in_bytes")],
    calculate: vdisk_calculations,
};

/// Virtual disks (v2 `virtual_disks/`, paged).
pub struct VirtualDisksCollector {
    client: Arc<PrismClient>,
    table: StatTable,
}

impl VirtualDisksCollector {
    pub fn new(client: Arc<PrismClient>) -> Self {
        Self {
            client,
            table: StatTable::new(&VDISK_LAYOUT),
        }
    }
}

#[async_trait::async_trait]
impl EntityCollector for VirtualDisksCollector {
    fn name(&self) -> &str {
        "virtual_disks"
    }

    async fn describe(&mut self) -> prism_client::Result<()> {
        self.table.reset();
        let vdisks = self
            .client
            .fetch_all_pages(ApiVersion::V2, "virtual_disks", &[])
            .await?;
        self.table.load(vdisks);
        Ok(())
    }

    fn collect(&self, sink: &mut MetricSink) {
        self.table.emit(sink);
    }
}
