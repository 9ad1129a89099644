mod distributed;
mod rayleigh_benard;
