//! Heap state reachable only from process-scoped globals: a registry of
//! typed records, plain-data points, and a dispatch-free linked list.

use heapcensus_core::{Result, TypedObject, protocol};
use heapcensus_fixtures::objects::globals::{
    self, Config, GLOBALS, Globals, Node, Pinned, Point3D, Record, chain_len, link_nodes,
};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{NODES, POINTS, RECORDS};

fn size_line<T>(name: &str) -> String {
    format!("  size_of::<{name}>() = {}\n", size_of::<T>())
}

fn main() -> Result<()> {
    run_fixture("globals_weak", |run| {
        run.phase("Initializing global Config")?;
        let mut staged = Globals::new();
        protocol::emit(&format!(
            "  Done: config.server_list.len() = {}\n  Done: id_pool.len() = {}\n",
            staged.config.server_list.len(),
            staged.id_pool.len()
        ))?;

        run.phase("Allocating Record instances into the global registry")?;
        let records = run.objects::<Record>(RECORDS)?;
        // SAFETY: records are never freed.
        staged.registry = unsafe { globals::registry(&records) };

        run.phase("Allocating Point3D instances (no dispatch pointer)")?;
        staged.points = run
            .objects::<Point3D>(POINTS)?
            .into_iter()
            // SAFETY: points are never freed or written again.
            .map(|p| unsafe { Pinned::new(p) })
            .collect();

        run.phase("Building Node linked list")?;
        let nodes = run.objects::<Node>(NODES)?;
        // SAFETY: nodes are fresh and never freed.
        let head = unsafe { link_nodes(&nodes) };
        // SAFETY: the chain was just linked from live nodes.
        let len = unsafe { chain_len(head) };
        // SAFETY: nodes are not written after linking.
        staged.list_head = head.map(|h| unsafe { Pinned::new(h) });

        let installed = GLOBALS.get_or_init(move || staged);
        protocol::emit(&format!(
            "  Done: registry.len() = {}, points = {}, list length = {len}\n",
            installed.registry.len(),
            installed.points.len()
        ))?;

        protocol::emit("\nObject sizes:\n")?;
        protocol::emit(&size_line::<Config>("Config"))?;
        protocol::emit(&size_line::<Record>(Record::TYPE_NAME))?;
        protocol::emit(&size_line::<Point3D>(Point3D::TYPE_NAME))?;
        protocol::emit(&size_line::<Node>(Node::TYPE_NAME))?;
        Ok(())
    })
}
