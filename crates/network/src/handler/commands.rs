mod dial;
mod listen;
mod peers;
