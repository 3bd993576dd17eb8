//! Multiple-inheritance shapes.
//!
//! Each base subobject carries its own dispatch pointer. The primary base
//! sits at offset 0; secondary bases point into secondary tables of the same
//! exported group, whose `offset_to_top` leads back to the full object.

use std::mem::offset_of;

use heapcensus_core::TypedObject;

use crate::dispatch::{TypeInfo, VPtr, Vtable, VtableHeader};

fn render() -> &'static str {
    "render"
}

fn check_collision() -> &'static str {
    "check_collision"
}

fn serialize() -> &'static str {
    "serialize"
}

fn destroy() -> &'static str {
    "destroy"
}

#[repr(C)]
pub struct Renderable {
    vptr: VPtr,
    pub render_id: i32,
    pub opacity: f64,
}

#[repr(C)]
pub struct Collidable {
    vptr: VPtr,
    pub collider_id: i32,
    pub radius: f64,
}

#[repr(C)]
pub struct Serializable {
    vptr: VPtr,
    pub serial_id: i32,
    pub format: [u8; 16],
}

impl Renderable {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl Collidable {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl Serializable {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

/// Two bases: `Renderable` (primary) and `Collidable`.
#[repr(C)]
pub struct GameObject {
    pub renderable: Renderable,
    pub collidable: Collidable,
    pub game_id: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Three bases: `Renderable` (primary), `Collidable`, `Serializable`.
#[repr(C)]
pub struct NetworkEntity {
    pub renderable: Renderable,
    pub collidable: Collidable,
    pub serializable: Serializable,
    pub net_id: i32,
    pub sync_tick: i32,
}

/// Single base, the control group.
#[repr(C)]
pub struct SimpleNpc {
    pub renderable: Renderable,
    pub npc_id: i32,
    pub speed: f64,
}

#[repr(C)]
pub struct GameObjectTables {
    pub primary: Vtable<2>,
    pub collidable: Vtable<2>,
}

#[repr(C)]
pub struct NetworkEntityTables {
    pub primary: Vtable<2>,
    pub collidable: Vtable<2>,
    pub serializable: Vtable<2>,
}

#[unsafe(no_mangle)]
#[allow(non_upper_case_globals)]
pub static _ZTI10GameObject: TypeInfo = TypeInfo { name: "GameObject" };

#[unsafe(no_mangle)]
#[allow(non_upper_case_globals)]
pub static _ZTI13NetworkEntity: TypeInfo = TypeInfo {
    name: "NetworkEntity",
};

#[unsafe(no_mangle)]
#[allow(non_upper_case_globals)]
pub static _ZTI9SimpleNpc: TypeInfo = TypeInfo { name: "SimpleNpc" };

const fn header(offset: usize, type_info: &'static TypeInfo) -> VtableHeader {
    VtableHeader {
        offset_to_top: -(offset as isize),
        type_info,
    }
}

#[unsafe(no_mangle)]
#[allow(non_upper_case_globals)]
pub static _ZTV10GameObject: GameObjectTables = GameObjectTables {
    primary: Vtable {
        header: header(0, &_ZTI10GameObject),
        slots: [render, destroy],
    },
    collidable: Vtable {
        header: header(offset_of!(GameObject, collidable), &_ZTI10GameObject),
        slots: [check_collision, destroy],
    },
};

#[unsafe(no_mangle)]
#[allow(non_upper_case_globals)]
pub static _ZTV13NetworkEntity: NetworkEntityTables = NetworkEntityTables {
    primary: Vtable {
        header: header(0, &_ZTI13NetworkEntity),
        slots: [render, destroy],
    },
    collidable: Vtable {
        header: header(offset_of!(NetworkEntity, collidable), &_ZTI13NetworkEntity),
        slots: [check_collision, destroy],
    },
    serializable: Vtable {
        header: header(offset_of!(NetworkEntity, serializable), &_ZTI13NetworkEntity),
        slots: [serialize, destroy],
    },
};

#[unsafe(no_mangle)]
#[allow(non_upper_case_globals)]
pub static _ZTV9SimpleNpc: Vtable<2> = Vtable {
    header: header(0, &_ZTI9SimpleNpc),
    slots: [render, destroy],
};

fn format_tag(tag: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let n = tag.len().min(15);
    out[..n].copy_from_slice(&tag.as_bytes()[..n]);
    out
}

impl TypedObject for GameObject {
    const TYPE_NAME: &'static str = "GameObject";
    const DISPATCH_OFFSETS: &'static [usize] = &[
        offset_of!(GameObject, renderable),
        offset_of!(GameObject, collidable),
    ];

    fn build(index: usize) -> Self {
        let i = index as f64;
        Self {
            renderable: Renderable {
                vptr: _ZTV10GameObject.primary.vptr(),
                render_id: index as i32,
                opacity: 1.0,
            },
            collidable: Collidable {
                vptr: _ZTV10GameObject.collidable.vptr(),
                collider_id: index as i32,
                radius: 5.0 + i * 0.1,
            },
            game_id: index as i32,
            x: i,
            y: i * 2.0,
            z: i * 3.0,
        }
    }
}

impl TypedObject for NetworkEntity {
    const TYPE_NAME: &'static str = "NetworkEntity";
    const DISPATCH_OFFSETS: &'static [usize] = &[
        offset_of!(NetworkEntity, renderable),
        offset_of!(NetworkEntity, collidable),
        offset_of!(NetworkEntity, serializable),
    ];

    fn build(index: usize) -> Self {
        Self {
            renderable: Renderable {
                vptr: _ZTV13NetworkEntity.primary.vptr(),
                render_id: index as i32,
                opacity: 0.8,
            },
            collidable: Collidable {
                vptr: _ZTV13NetworkEntity.collidable.vptr(),
                collider_id: index as i32,
                radius: 3.0,
            },
            serializable: Serializable {
                vptr: _ZTV13NetworkEntity.serializable.vptr(),
                serial_id: index as i32,
                format: format_tag("json"),
            },
            net_id: index as i32,
            sync_tick: 100 + index as i32,
        }
    }
}

impl TypedObject for SimpleNpc {
    const TYPE_NAME: &'static str = "SimpleNpc";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            renderable: Renderable {
                vptr: _ZTV9SimpleNpc.vptr(),
                render_id: index as i32,
                opacity: 1.0,
            },
            npc_id: index as i32,
            speed: 10.0 + index as f64 * 0.01,
        }
    }
}
