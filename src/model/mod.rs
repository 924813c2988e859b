mod block;
pub mod resnet;
pub mod weights;
