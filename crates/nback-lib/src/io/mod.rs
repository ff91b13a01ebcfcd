pub mod eye;
