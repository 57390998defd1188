use crate::{common::*, error::FaderError};

/// Expands `[batch, num_attr]` attributes into constant `[batch, num_attr, height, width]` maps.
pub fn broadcast_attributes(attrs: &Tensor, height: i64, width: i64) -> Result<Tensor> {
    let (batch_size, num_attr) = attrs
        .size2()
        .map_err(|_| FaderError::shape_mismatch("attributes", "[batch, num_attr]", attrs.size()))?;
    ensure!(
        height > 0 && width > 0,
        "broadcast size must be positive, but get {}x{}",
        height,
        width
    );

    let maps = attrs
        .reshape(&[batch_size, num_attr, 1, 1])
        .expand(&[batch_size, num_attr, height, width], false);
    Ok(maps)
}

/// Concatenates broadcast attribute maps to the channels of a `[batch, c, h, w]` activation.
pub fn concat_attributes(xs: &Tensor, attrs: &Tensor) -> Result<Tensor> {
    let (batch_size, _c, height, width) = xs
        .size4()
        .map_err(|_| FaderError::shape_mismatch("activation", "[batch, c, h, w]", xs.size()))?;
    let maps = broadcast_attributes(attrs, height, width)?;
    if maps.size()[0] != batch_size {
        return Err(FaderError::shape_mismatch(
            "attributes",
            format!("batch size {}", batch_size),
            attrs.size(),
        )
        .into());
    }

    Ok(Tensor::cat(&[xs, &maps], 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_attributes_test() -> Result<()> {
        let bs = 3;
        let num_attr = 39;
        let attrs = Tensor::rand(&[bs, num_attr], FLOAT_CPU);

        [(2, 2), (4, 4), (8, 8), (128, 128), (3, 5)]
            .iter()
            .try_for_each(|&(h, w)| -> Result<_> {
                let maps = broadcast_attributes(&attrs, h, w)?;
                ensure!(maps.size() == vec![bs, num_attr, h, w], "incorrect output shape");

                for row in 0..h {
                    for col in 0..w {
                        let slice = maps.select(3, col).select(2, row);
                        ensure!(slice.equal(&attrs), "spatial slice differs from input");
                    }
                }
                Ok(())
            })?;

        Ok(())
    }

    #[test]
    fn broadcast_rejects_bad_rank_test() -> Result<()> {
        let attrs = Tensor::rand(&[2, 39, 1], FLOAT_CPU);
        let err = broadcast_attributes(&attrs, 2, 2).unwrap_err();
        ensure!(matches!(
            err.downcast_ref::<FaderError>(),
            Some(FaderError::ShapeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn concat_attributes_test() -> Result<()> {
        let xs = Tensor::rand(&[2, 16, 8, 8], FLOAT_CPU);
        let attrs = Tensor::rand(&[2, 5], FLOAT_CPU);
        let output = concat_attributes(&xs, &attrs)?;
        ensure!(output.size() == vec![2, 21, 8, 8]);
        ensure!(output.narrow(1, 0, 16).equal(&xs));

        let attrs = Tensor::rand(&[3, 5], FLOAT_CPU);
        ensure!(concat_attributes(&xs, &attrs).is_err());
        Ok(())
    }
}
