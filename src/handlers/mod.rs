pub mod ltp;
