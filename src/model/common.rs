use uuid::Uuid;

pub type Id = Uuid;

pub fn generate_id() -> Id {
    Uuid::new_v4()
}
