//! One constructed Widget at the head of zeroed blocks sized for 2, 3, 5 and
//! 8 instances. An analyzer should report one Widget per block.

use heapcensus_core::{GroupLayout, Result, protocol};
use heapcensus_fixtures::objects::widget::{SPLIT_GROUPS, Widget};
use heapcensus_fixtures::run_fixture;

fn main() -> Result<()> {
    run_fixture("split_n_threshold", |run| {
        let mut held = Vec::with_capacity(SPLIT_GROUPS.len());
        for (per_block, count, id_base) in SPLIT_GROUPS {
            run.phase(&format!(
                "Allocating {count} blocks of {} bytes (N={per_block})",
                per_block * size_of::<Widget>()
            ))?;
            let widgets = run.grouped::<Widget>(per_block, count, GroupLayout::Leading)?;
            for (i, widget) in widgets.iter().enumerate() {
                // SAFETY: slot 0 of each block was constructed by the generator.
                let widget = unsafe { &mut *widget.as_ptr() };
                widget.id = id_base + i as i32;
                widget.value = i as f64 * per_block as f64 * 0.1;
            }
            held.push(widgets);
        }
        protocol::emit(&format!("\n  sizeof(Widget) = {}\n", size_of::<Widget>()))?;
        Ok(held)
    })
}
