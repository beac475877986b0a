mod buffer_mut;

pub(crate) use buffer_mut::BufferMut;
