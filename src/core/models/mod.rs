pub mod key_material;
pub mod object_ref;
pub mod recipient;
